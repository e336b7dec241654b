use serde::Deserialize;
use serde_json::Value as JsonValue;

use phonestore_core::{DomainError, DomainResult, PhoneId, StoreId};
use phonestore_inventory::{OrderBatch, OrderLine, PhoneDraft, PhoneModel, RawPhoneDraft};

// -------------------------
// Request DTOs
// -------------------------

/// Body of increase/decrease requests on `/store`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityRequest {
    pub phone_id: Option<String>,
    pub quantity: Option<JsonValue>,
    pub store_id: Option<String>,
}

impl QuantityRequest {
    pub fn into_parts(self) -> DomainResult<(PhoneId, u32, Option<StoreId>)> {
        let phone_id = parse_phone_id(self.phone_id.as_deref())?;
        let quantity = positive_amount("quantity", self.quantity.as_ref())?;
        let store_id = self
            .store_id
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<StoreId>())
            .transpose()?;
        Ok((phone_id, quantity, store_id))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub phone_id: Option<String>,
    pub quantity: Option<JsonValue>,
    pub store_id: Option<String>,
}

/// Body of `/store/orderPhones`. Lines without a `storeId` take the
/// request-level one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub store_id: Option<String>,
    #[serde(default)]
    pub orders: Vec<OrderLineRequest>,
}

impl OrderRequest {
    pub fn into_batch(self) -> DomainResult<OrderBatch> {
        let default_store = self.store_id.filter(|s| !s.trim().is_empty());

        let lines = self
            .orders
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                let store = line
                    .store_id
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| default_store.clone())
                    .ok_or_else(|| DomainError::validation(format!("order line {index}: storeId is required")))?;
                Ok(OrderLine {
                    phone_id: parse_phone_id(line.phone_id.as_deref())?,
                    quantity: positive_amount("quantity", line.quantity.as_ref())?,
                    store_id: store.parse()?,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        OrderBatch::new(lines)
    }
}

/// Body of `/inventory/decrease`.
#[derive(Debug, Deserialize)]
pub struct DecreaseRequest {
    pub id: Option<String>,
    pub value: Option<JsonValue>,
}

impl DecreaseRequest {
    pub fn into_parts(self) -> DomainResult<(PhoneId, u32)> {
        let id = parse_phone_id(self.id.as_deref())?;
        let amount = positive_amount("value", self.value.as_ref())?;
        Ok((id, amount))
    }
}

/// `?ids=a,b` / `?models=A,B` query strings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub ids: Option<String>,
    pub models: Option<String>,
}

impl ListQuery {
    pub fn phone_ids(&self) -> DomainResult<Vec<PhoneId>> {
        split_list("ids", self.ids.as_deref())?
            .into_iter()
            .map(|s| s.parse())
            .collect()
    }

    pub fn phone_models(&self) -> DomainResult<Vec<PhoneModel>> {
        split_list("models", self.models.as_deref())?
            .into_iter()
            .map(str::parse::<PhoneModel>)
            .collect()
    }
}

pub fn phone_drafts(raw: Vec<RawPhoneDraft>) -> DomainResult<Vec<PhoneDraft>> {
    if raw.is_empty() {
        return Err(DomainError::validation("phones list cannot be empty"));
    }
    raw.into_iter().map(RawPhoneDraft::validate).collect()
}

pub fn parse_phone_id(raw: Option<&str>) -> DomainResult<PhoneId> {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.parse(),
        _ => Err(DomainError::validation("Phone ID cannot be null or empty")),
    }
}

pub fn parse_store_id(raw: &str) -> DomainResult<StoreId> {
    raw.parse()
}

/// A strictly positive integer amount.
fn positive_amount(field: &str, raw: Option<&JsonValue>) -> DomainResult<u32> {
    let value = raw.ok_or_else(|| DomainError::validation(format!("{field} is required")))?;
    let n = value
        .as_i64()
        .ok_or_else(|| DomainError::validation(format!("{field} must be a valid integer")))?;
    if n <= 0 {
        return Err(DomainError::validation(format!("{field} must be greater than 0")));
    }
    u32::try_from(n).map_err(|_| DomainError::validation(format!("{field} is out of range")))
}

fn split_list<'a>(field: &str, raw: Option<&'a str>) -> DomainResult<Vec<&'a str>> {
    let items: Vec<&str> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return Err(DomainError::validation(format!("{field} list cannot be empty")));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_lines_inherit_the_request_store() {
        let id = PhoneId::new();
        let req: OrderRequest = serde_json::from_value(json!({
            "storeId": "s-1",
            "orders": [
                { "phoneId": id.to_string(), "quantity": 2 },
                { "phoneId": id.to_string(), "quantity": 1, "storeId": "s-2" }
            ]
        }))
        .unwrap();
        let batch = req.into_batch().unwrap();
        assert_eq!(batch.lines()[0].store_id.as_str(), "s-1");
        assert_eq!(batch.lines()[1].store_id.as_str(), "s-2");
    }

    #[test]
    fn order_lines_must_be_complete_at_the_boundary() {
        let req: OrderRequest = serde_json::from_value(json!({
            "orders": [{ "phoneId": PhoneId::new().to_string(), "quantity": 2 }]
        }))
        .unwrap();
        assert!(matches!(req.into_batch(), Err(DomainError::Validation(_))));

        let req: OrderRequest = serde_json::from_value(json!({ "storeId": "s", "orders": [] })).unwrap();
        assert!(req.into_batch().is_err());
    }

    #[test]
    fn amounts_must_be_positive_integers() {
        let id = PhoneId::new().to_string();
        for bad in [json!(0), json!(-3), json!("5"), json!(1.5)] {
            let req = DecreaseRequest {
                id: Some(id.clone()),
                value: Some(bad),
            };
            assert!(matches!(req.into_parts(), Err(DomainError::Validation(_))));
        }
        let req = DecreaseRequest {
            id: Some(id),
            value: Some(json!(4)),
        };
        assert_eq!(req.into_parts().unwrap().1, 4);
    }

    #[test]
    fn list_queries_split_on_commas() {
        let q = ListQuery {
            ids: None,
            models: Some("apple, Samsung,,".into()),
        };
        assert_eq!(q.phone_models().unwrap(), vec![PhoneModel::Apple, PhoneModel::Samsung]);
        assert!(matches!(q.phone_ids(), Err(DomainError::Validation(_))));

        let q = ListQuery {
            ids: Some("not-a-uuid".into()),
            models: None,
        };
        assert!(matches!(q.phone_ids(), Err(DomainError::InvalidId(_))));
    }
}
