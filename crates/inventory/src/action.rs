//! Typed inventory commands.
//!
//! Envelopes carry an open-ended action string and an untyped payload. This
//! module turns them into one closed variant type per channel, decoded once at
//! the channel boundary:
//!
//! - a tag nobody knows is `DecodeError::UnknownAction`
//! - a known tag on the wrong channel is `DecodeError::Misrouted`
//! - a payload that does not fit the tag is `DecodeError::Invalid`
//!
//! `encode` produces the exact wire parts `decode` accepts, so typed
//! publishers and foreign producers share one payload convention.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

use phonestore_core::{DomainError, PhoneId, StoreId};
use phonestore_events::{Channel, CommandEnvelope};

use crate::item::{PhoneDraft, PhoneModel, RawPhoneDraft};

/// The closed set of action tags, each bound to exactly one channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionTag {
    GetPhoneById,
    GetPhonesByIds,
    GetPhonesByModel,
    GetPhonesByModels,
    GetAllPhones,
    GetPhonesByStoreId,
    AddPhones,
    OrderPhones,
    IncreaseQuantity,
    DecreaseQuantity,
    DeletePhoneById,
    DeletePhonesByIds,
    DeletePhoneByStoreId,
}

impl ActionTag {
    pub const ALL: [ActionTag; 13] = [
        ActionTag::GetPhoneById,
        ActionTag::GetPhonesByIds,
        ActionTag::GetPhonesByModel,
        ActionTag::GetPhonesByModels,
        ActionTag::GetAllPhones,
        ActionTag::GetPhonesByStoreId,
        ActionTag::AddPhones,
        ActionTag::OrderPhones,
        ActionTag::IncreaseQuantity,
        ActionTag::DecreaseQuantity,
        ActionTag::DeletePhoneById,
        ActionTag::DeletePhonesByIds,
        ActionTag::DeletePhoneByStoreId,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ActionTag::GetPhoneById => "GET_PHONE_BY_ID",
            ActionTag::GetPhonesByIds => "GET_PHONES_BY_IDS",
            ActionTag::GetPhonesByModel => "GET_PHONES_BY_MODEL",
            ActionTag::GetPhonesByModels => "GET_PHONES_BY_MODELS",
            ActionTag::GetAllPhones => "GET_ALL_PHONES",
            ActionTag::GetPhonesByStoreId => "GET_PHONES_BY_STORE_ID",
            ActionTag::AddPhones => "ADD_PHONES",
            ActionTag::OrderPhones => "ORDER_PHONES",
            ActionTag::IncreaseQuantity => "INCREASE_QUANTITY",
            ActionTag::DecreaseQuantity => "DECREASE_QUANTITY",
            ActionTag::DeletePhoneById => "DELETE_PHONE_BY_ID",
            ActionTag::DeletePhonesByIds => "DELETE_PHONES_BY_IDS",
            ActionTag::DeletePhoneByStoreId => "DELETE_PHONE_BY_STORE_ID",
        }
    }

    /// Exact (case-sensitive) wire lookup.
    pub fn from_wire(tag: &str) -> Option<Self> {
        ActionTag::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    pub const fn channel(self) -> Channel {
        match self {
            ActionTag::GetPhoneById
            | ActionTag::GetPhonesByIds
            | ActionTag::GetPhonesByModel
            | ActionTag::GetPhonesByModels
            | ActionTag::GetAllPhones
            | ActionTag::GetPhonesByStoreId => Channel::Query,
            ActionTag::AddPhones
            | ActionTag::OrderPhones
            | ActionTag::IncreaseQuantity
            | ActionTag::DecreaseQuantity => Channel::Mutate,
            ActionTag::DeletePhoneById
            | ActionTag::DeletePhonesByIds
            | ActionTag::DeletePhoneByStoreId => Channel::Delete,
        }
    }
}

impl core::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown action tag {0:?}")]
    UnknownAction(String),

    #[error("action {action} belongs on {expected}, received on {received}")]
    Misrouted {
        action: ActionTag,
        expected: Channel,
        received: Channel,
    },

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl DecodeError {
    fn misrouted(action: ActionTag, received: Channel) -> Self {
        Self::Misrouted {
            action,
            expected: action.channel(),
            received,
        }
    }
}

/// What a command looks like on the wire, minus correlation id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct WireCommand {
    pub action: ActionTag,
    pub store_id: Option<StoreId>,
    pub payload: JsonValue,
}

impl WireCommand {
    pub fn into_envelope(self) -> CommandEnvelope {
        CommandEnvelope::stamped(self.action.as_str(), self.store_id, self.payload)
    }
}

// ---- query channel

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryCommand {
    GetById(PhoneId),
    GetByIds(Vec<PhoneId>),
    GetByModel(PhoneModel),
    GetByModels(Vec<PhoneModel>),
    GetAll,
    GetByStore(StoreId),
}

impl QueryCommand {
    pub fn action(&self) -> ActionTag {
        match self {
            QueryCommand::GetById(_) => ActionTag::GetPhoneById,
            QueryCommand::GetByIds(_) => ActionTag::GetPhonesByIds,
            QueryCommand::GetByModel(_) => ActionTag::GetPhonesByModel,
            QueryCommand::GetByModels(_) => ActionTag::GetPhonesByModels,
            QueryCommand::GetAll => ActionTag::GetAllPhones,
            QueryCommand::GetByStore(_) => ActionTag::GetPhonesByStoreId,
        }
    }

    pub fn decode(envelope: &CommandEnvelope) -> Result<Self, DecodeError> {
        let tag = parse_tag(envelope)?;
        let payload = envelope.payload();
        let command = match tag {
            ActionTag::GetPhoneById => {
                let map = object(tag, payload)?;
                QueryCommand::GetById(phone_id(tag, map, "phoneId")?)
            }
            ActionTag::GetPhonesByIds => {
                let map = object(tag, payload)?;
                // A lookup returns whatever matches: ids that can never match
                // are dropped, not fatal.
                let ids = strings(tag, map, &["phoneIds", "ids"])?
                    .into_iter()
                    .filter_map(|s| match parse_phone_id(s.strip_prefix("ids=").unwrap_or(s)) {
                        Ok(id) => Some(id),
                        Err(e) => {
                            tracing::warn!(id = s, reason = %e, "ignoring malformed phone id in lookup");
                            None
                        }
                    })
                    .collect();
                QueryCommand::GetByIds(ids)
            }
            ActionTag::GetPhonesByModel => {
                let map = object(tag, payload)?;
                QueryCommand::GetByModel(text(tag, map, "model")?.parse()?)
            }
            ActionTag::GetPhonesByModels => {
                let map = object(tag, payload)?;
                let models = strings(tag, map, &["models"])?
                    .into_iter()
                    .map(str::parse::<PhoneModel>)
                    .collect::<Result<Vec<PhoneModel>, _>>()?;
                QueryCommand::GetByModels(models)
            }
            ActionTag::GetAllPhones => QueryCommand::GetAll,
            ActionTag::GetPhonesByStoreId => {
                let store = scope(envelope).ok_or_else(|| missing(tag, "storeId"))?;
                QueryCommand::GetByStore(store)
            }
            other => return Err(DecodeError::misrouted(other, Channel::Query)),
        };
        Ok(command)
    }

    pub fn encode(&self) -> WireCommand {
        let (store_id, payload) = match self {
            QueryCommand::GetById(id) => (None, json!({ "phoneId": id })),
            QueryCommand::GetByIds(ids) => (None, json!({ "phoneIds": ids })),
            QueryCommand::GetByModel(model) => (None, json!({ "model": model })),
            QueryCommand::GetByModels(models) => (None, json!({ "models": models })),
            QueryCommand::GetAll => (None, json!({})),
            QueryCommand::GetByStore(store) => {
                (Some(store.clone()), json!({ "storeId": store }))
            }
        };
        WireCommand {
            action: self.action(),
            store_id,
            payload,
        }
    }
}

// ---- mutate channel

/// One line of an order: take `quantity` units of `phone_id` from `store_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub phone_id: PhoneId,
    pub quantity: u32,
    pub store_id: StoreId,
}

/// A line dropped while decoding an order batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub index: usize,
    pub reason: String,
}

/// Order lines that decoded cleanly, plus the ones that did not.
///
/// Never empty: a batch without a single usable line does not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBatch {
    lines: Vec<OrderLine>,
    positions: Vec<usize>,
    skipped: Vec<SkippedLine>,
    snapshot_store: StoreId,
}

impl OrderBatch {
    pub fn new(lines: Vec<OrderLine>) -> Result<Self, DomainError> {
        let Some(first) = lines.first() else {
            return Err(DomainError::validation("an order needs at least one line"));
        };
        Ok(Self {
            snapshot_store: first.store_id.clone(),
            positions: (0..lines.len()).collect(),
            lines,
            skipped: Vec::new(),
        })
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Lines paired with their index in the submitted order list.
    pub fn indexed_lines(&self) -> impl Iterator<Item = (usize, &OrderLine)> {
        self.positions.iter().copied().zip(self.lines.iter())
    }

    pub fn skipped(&self) -> &[SkippedLine] {
        &self.skipped
    }

    /// Store whose stock the batch result reports on: the first submitted
    /// line's, even when that line was skipped, as long as its `storeId` is
    /// usable; otherwise the first decoded line's.
    pub fn snapshot_store(&self) -> &StoreId {
        &self.snapshot_store
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutateCommand {
    AddPhones {
        store_id: StoreId,
        drafts: Vec<PhoneDraft>,
    },
    Order(OrderBatch),
    Increase {
        phone_id: PhoneId,
        quantity: u32,
        store_id: Option<StoreId>,
    },
    Decrease {
        phone_id: PhoneId,
        quantity: u32,
        store_id: Option<StoreId>,
    },
}

impl MutateCommand {
    pub fn action(&self) -> ActionTag {
        match self {
            MutateCommand::AddPhones { .. } => ActionTag::AddPhones,
            MutateCommand::Order(_) => ActionTag::OrderPhones,
            MutateCommand::Increase { .. } => ActionTag::IncreaseQuantity,
            MutateCommand::Decrease { .. } => ActionTag::DecreaseQuantity,
        }
    }

    pub fn decode(envelope: &CommandEnvelope) -> Result<Self, DecodeError> {
        let tag = parse_tag(envelope)?;
        let payload = envelope.payload();
        let command = match tag {
            ActionTag::AddPhones => {
                let store_id = envelope
                    .store_id()
                    .cloned()
                    .ok_or_else(|| DomainError::payload_shape("ADD_PHONES requires a store scope"))?;
                let list = match payload {
                    JsonValue::Array(list) => list,
                    JsonValue::Object(map) => array(tag, map, &["phones"])?,
                    _ => return Err(shape(tag, "a list of phone drafts").into()),
                };
                if list.is_empty() {
                    return Err(shape(tag, "at least one phone draft").into());
                }
                let drafts = list
                    .iter()
                    .map(|raw| {
                        serde_json::from_value::<RawPhoneDraft>(raw.clone())
                            .map_err(|e| DomainError::payload_shape(format!("ADD_PHONES draft: {e}")))?
                            .validate()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                MutateCommand::AddPhones { store_id, drafts }
            }
            ActionTag::OrderPhones => MutateCommand::Order(decode_order(payload)?),
            ActionTag::IncreaseQuantity | ActionTag::DecreaseQuantity => {
                let map = object(tag, payload)?;
                let phone_id = phone_id(tag, map, "phoneId")?;
                let quantity = amount(tag, map, "quantity")?;
                let store_id = scope(envelope);
                if tag == ActionTag::IncreaseQuantity {
                    MutateCommand::Increase {
                        phone_id,
                        quantity,
                        store_id,
                    }
                } else {
                    MutateCommand::Decrease {
                        phone_id,
                        quantity,
                        store_id,
                    }
                }
            }
            other => return Err(DecodeError::misrouted(other, Channel::Mutate)),
        };
        Ok(command)
    }

    pub fn encode(&self) -> WireCommand {
        let (store_id, payload) = match self {
            MutateCommand::AddPhones { store_id, drafts } => (Some(store_id.clone()), json!(drafts)),
            MutateCommand::Order(batch) => (
                Some(batch.snapshot_store().clone()),
                json!({ "storeId": batch.snapshot_store(), "orders": batch.lines() }),
            ),
            MutateCommand::Increase {
                phone_id,
                quantity,
                store_id,
            }
            | MutateCommand::Decrease {
                phone_id,
                quantity,
                store_id,
            } => (
                store_id.clone(),
                json!({ "phoneId": phone_id, "quantity": quantity }),
            ),
        };
        WireCommand {
            action: self.action(),
            store_id,
            payload,
        }
    }
}

fn decode_order(payload: &JsonValue) -> Result<OrderBatch, DecodeError> {
    let tag = ActionTag::OrderPhones;
    let list = match payload {
        JsonValue::Object(map) => array(tag, map, &["orders"])?,
        JsonValue::Array(list) => list,
        _ => return Err(shape(tag, "an `orders` list").into()),
    };

    let mut lines = Vec::with_capacity(list.len());
    let mut positions = Vec::with_capacity(list.len());
    let mut skipped = Vec::new();
    for (index, raw) in list.iter().enumerate() {
        match decode_order_line(raw) {
            Ok(line) => {
                lines.push(line);
                positions.push(index);
            }
            Err(e) => {
                tracing::warn!(index, reason = %e, "skipping malformed order line");
                skipped.push(SkippedLine {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    let Some(first_decoded) = lines.first() else {
        return Err(DomainError::payload_shape(format!(
            "ORDER_PHONES has no usable order lines ({} skipped)",
            skipped.len()
        ))
        .into());
    };
    let snapshot_store = list
        .first()
        .and_then(JsonValue::as_object)
        .and_then(|line| line.get("storeId"))
        .and_then(JsonValue::as_str)
        .and_then(|s| s.parse::<StoreId>().ok())
        .unwrap_or_else(|| first_decoded.store_id.clone());

    Ok(OrderBatch {
        lines,
        positions,
        skipped,
        snapshot_store,
    })
}

fn decode_order_line(raw: &JsonValue) -> Result<OrderLine, DomainError> {
    let tag = ActionTag::OrderPhones;
    let map = raw
        .as_object()
        .ok_or_else(|| DomainError::payload_shape("order line is not an object"))?;
    Ok(OrderLine {
        phone_id: phone_id(tag, map, "phoneId")?,
        quantity: amount(tag, map, "quantity")?,
        store_id: text(tag, map, "storeId")?.parse()?,
    })
}

// ---- delete channel

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCommand {
    DeleteById(PhoneId),
    DeleteByIds(Vec<PhoneId>),
    DeleteByStore(StoreId),
}

impl DeleteCommand {
    pub fn action(&self) -> ActionTag {
        match self {
            DeleteCommand::DeleteById(_) => ActionTag::DeletePhoneById,
            DeleteCommand::DeleteByIds(_) => ActionTag::DeletePhonesByIds,
            DeleteCommand::DeleteByStore(_) => ActionTag::DeletePhoneByStoreId,
        }
    }

    pub fn decode(envelope: &CommandEnvelope) -> Result<Self, DecodeError> {
        let tag = parse_tag(envelope)?;
        let payload = envelope.payload();
        let command = match tag {
            ActionTag::DeletePhoneById => {
                let map = object(tag, payload)?;
                DeleteCommand::DeleteById(phone_id(tag, map, "phoneId")?)
            }
            ActionTag::DeletePhonesByIds => {
                let map = object(tag, payload)?;
                let ids = strings(tag, map, &["phoneIds", "ids"])?
                    .into_iter()
                    .map(parse_phone_id)
                    .collect::<Result<Vec<_>, _>>()?;
                DeleteCommand::DeleteByIds(ids)
            }
            ActionTag::DeletePhoneByStoreId => {
                let store = scope(envelope).ok_or_else(|| missing(tag, "storeId"))?;
                DeleteCommand::DeleteByStore(store)
            }
            other => return Err(DecodeError::misrouted(other, Channel::Delete)),
        };
        Ok(command)
    }

    pub fn encode(&self) -> WireCommand {
        let (store_id, payload) = match self {
            DeleteCommand::DeleteById(id) => (None, json!({ "phoneId": id })),
            DeleteCommand::DeleteByIds(ids) => (None, json!({ "phoneIds": ids })),
            DeleteCommand::DeleteByStore(store) => (Some(store.clone()), JsonValue::Null),
        };
        WireCommand {
            action: self.action(),
            store_id,
            payload,
        }
    }
}

// ---- any channel

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCommand {
    Query(QueryCommand),
    Mutate(MutateCommand),
    Delete(DeleteCommand),
}

impl InventoryCommand {
    pub fn channel(&self) -> Channel {
        match self {
            InventoryCommand::Query(_) => Channel::Query,
            InventoryCommand::Mutate(_) => Channel::Mutate,
            InventoryCommand::Delete(_) => Channel::Delete,
        }
    }

    pub fn action(&self) -> ActionTag {
        match self {
            InventoryCommand::Query(c) => c.action(),
            InventoryCommand::Mutate(c) => c.action(),
            InventoryCommand::Delete(c) => c.action(),
        }
    }

    /// Decode an envelope received on `channel`.
    pub fn decode(channel: Channel, envelope: &CommandEnvelope) -> Result<Self, DecodeError> {
        Ok(match channel {
            Channel::Query => InventoryCommand::Query(QueryCommand::decode(envelope)?),
            Channel::Mutate => InventoryCommand::Mutate(MutateCommand::decode(envelope)?),
            Channel::Delete => InventoryCommand::Delete(DeleteCommand::decode(envelope)?),
        })
    }

    pub fn encode(&self) -> WireCommand {
        match self {
            InventoryCommand::Query(c) => c.encode(),
            InventoryCommand::Mutate(c) => c.encode(),
            InventoryCommand::Delete(c) => c.encode(),
        }
    }
}

impl From<QueryCommand> for InventoryCommand {
    fn from(value: QueryCommand) -> Self {
        Self::Query(value)
    }
}

impl From<MutateCommand> for InventoryCommand {
    fn from(value: MutateCommand) -> Self {
        Self::Mutate(value)
    }
}

impl From<DeleteCommand> for InventoryCommand {
    fn from(value: DeleteCommand) -> Self {
        Self::Delete(value)
    }
}

// ---- payload helpers

fn parse_tag(envelope: &CommandEnvelope) -> Result<ActionTag, DecodeError> {
    ActionTag::from_wire(envelope.action())
        .ok_or_else(|| DecodeError::UnknownAction(envelope.action().to_string()))
}

fn shape(tag: ActionTag, expected: &str) -> DomainError {
    DomainError::payload_shape(format!("{tag} expects {expected}"))
}

fn missing(tag: ActionTag, key: &str) -> DomainError {
    DomainError::payload_shape(format!("{tag} requires a non-blank `{key}`"))
}

fn object(tag: ActionTag, payload: &JsonValue) -> Result<&Map<String, JsonValue>, DomainError> {
    payload.as_object().ok_or_else(|| shape(tag, "an object payload"))
}

fn text<'a>(tag: ActionTag, map: &'a Map<String, JsonValue>, key: &str) -> Result<&'a str, DomainError> {
    match map.get(key).and_then(JsonValue::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(missing(tag, key)),
    }
}

/// First of `keys` present in `map`, as a non-empty list.
fn array<'a>(
    tag: ActionTag,
    map: &'a Map<String, JsonValue>,
    keys: &[&str],
) -> Result<&'a Vec<JsonValue>, DomainError> {
    let key = keys[0];
    match keys.iter().find_map(|k| map.get(*k)) {
        Some(JsonValue::Array(list)) if !list.is_empty() => Ok(list),
        Some(JsonValue::Array(_)) | None | Some(JsonValue::Null) => {
            Err(shape(tag, &format!("a non-empty `{key}` list")))
        }
        Some(_) => Err(shape(tag, &format!("`{key}` to be a list"))),
    }
}

fn strings<'a>(
    tag: ActionTag,
    map: &'a Map<String, JsonValue>,
    keys: &[&str],
) -> Result<Vec<&'a str>, DomainError> {
    array(tag, map, keys)?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::trim)
                .ok_or_else(|| shape(tag, &format!("`{}` to contain strings", keys[0])))
        })
        .collect()
}

fn parse_phone_id(raw: &str) -> Result<PhoneId, DomainError> {
    raw.parse()
}

fn phone_id(tag: ActionTag, map: &Map<String, JsonValue>, key: &str) -> Result<PhoneId, DomainError> {
    parse_phone_id(text(tag, map, key)?)
}

/// A non-negative integer amount that fits in `u32`.
fn amount(tag: ActionTag, map: &Map<String, JsonValue>, key: &str) -> Result<u32, DomainError> {
    let value = map.get(key).ok_or_else(|| missing(tag, key))?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n)
            .map_err(|_| DomainError::validation(format!("{tag}: `{key}` is out of range")));
    }
    match value.as_i64() {
        Some(_) => Err(DomainError::validation(format!("{tag}: `{key}` cannot be negative"))),
        None => Err(shape(tag, &format!("`{key}` to be an integer"))),
    }
}

/// Store scope from the envelope, falling back to a `storeId` payload field.
fn scope(envelope: &CommandEnvelope) -> Option<StoreId> {
    envelope.store_id().cloned().or_else(|| {
        envelope
            .payload()
            .get("storeId")
            .and_then(JsonValue::as_str)
            .and_then(|s| s.parse().ok())
    })
}
