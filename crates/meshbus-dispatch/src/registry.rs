use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use meshbus_frame::{Frame, RAW};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::body::BodyCodec;
use crate::config::DispatchConfig;
use crate::error::{BodyError, DispatchError, Result};
use crate::subscription::{Queue, Sink, Subscription};

/// Types that can travel as typed messages.
///
/// Every subscriber receives its own clone of a decoded message.
pub trait MeshMessage: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> MeshMessage for T {}

type EncodeFn =
    Arc<dyn Fn(&(dyn Any + Send)) -> std::result::Result<Vec<u8>, BodyError> + Send + Sync>;
type DecodeFn =
    Arc<dyn Fn(&[u8]) -> std::result::Result<Box<dyn Any + Send>, BodyError> + Send + Sync>;

/// What happened to one dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to `receivers` open subscriptions.
    Delivered { tag: u8, receivers: usize },
    /// The tag is registered (or raw) but nobody is subscribed.
    NoSubscribers { tag: u8 },
    /// No type is registered for the tag; the frame was dropped.
    UnknownTag { tag: u8 },
    /// The body did not decode as the registered type; the frame was dropped.
    DecodeFailed { tag: u8 },
}

struct TypeEntry {
    type_id: TypeId,
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
    subscribers: Vec<Arc<dyn Sink>>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<u8, TypeEntry>,
    tags_by_type: HashMap<TypeId, u8>,
    raw: Vec<Arc<Queue<Bytes>>>,
    closed: bool,
}

/// Tag-keyed registry of message codecs and their subscribers.
pub struct DispatchRegistry {
    table: RwLock<Table>,
    config: DispatchConfig,
}

impl DispatchRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `M` to `tag`, encoding and decoding bodies with `codec`.
    pub fn register<M, C>(&self, tag: u8, codec: Arc<C>) -> Result<()>
    where
        M: MeshMessage + Serialize + DeserializeOwned,
        C: BodyCodec,
    {
        let decoder = Arc::clone(&codec);
        self.register_with::<M, _, _>(
            tag,
            move |message: &M| codec.encode(message),
            move |bytes: &[u8]| decoder.decode::<M>(bytes),
        )
    }

    /// Bind `M` to `tag` with an explicit encode/decode pair.
    ///
    /// Registering the same type under the same tag again is a no-op and
    /// keeps the first pair.
    pub fn register_with<M, E, D>(&self, tag: u8, encode: E, decode: D) -> Result<()>
    where
        M: MeshMessage,
        E: Fn(&M) -> std::result::Result<Vec<u8>, BodyError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> std::result::Result<M, BodyError> + Send + Sync + 'static,
    {
        if tag == RAW {
            return Err(DispatchError::ReservedTag(tag));
        }

        let type_id = TypeId::of::<M>();
        let requested = type_name::<M>();
        let mut table = self.write();

        if let Some(existing) = table.entries.get(&tag) {
            if existing.type_id == type_id {
                debug!(tag, type_name = requested, "type already registered");
                return Ok(());
            }
            return Err(DispatchError::DuplicateTag {
                tag,
                existing: existing.type_name,
                requested,
            });
        }
        if let Some(existing_tag) = table.tags_by_type.get(&type_id) {
            return Err(DispatchError::DuplicateType {
                type_name: requested,
                tag: *existing_tag,
            });
        }

        let encode: EncodeFn = Arc::new(move |value: &(dyn Any + Send)| {
            let message = value
                .downcast_ref::<M>()
                .ok_or_else(|| BodyError::new("message type does not match registration"))?;
            encode(message)
        });
        let decode: DecodeFn = Arc::new(move |bytes: &[u8]| {
            decode(bytes).map(|message| Box::new(message) as Box<dyn Any + Send>)
        });

        table.entries.insert(
            tag,
            TypeEntry {
                type_id,
                type_name: requested,
                encode,
                decode,
                subscribers: Vec::new(),
            },
        );
        table.tags_by_type.insert(type_id, tag);
        debug!(tag, type_name = requested, "registered message type");
        Ok(())
    }

    /// Tag registered for `M`, if any.
    pub fn tag_of<M: 'static>(&self) -> Option<u8> {
        self.read().tags_by_type.get(&TypeId::of::<M>()).copied()
    }

    /// Check if a tag has a registered type.
    pub fn is_registered(&self, tag: u8) -> bool {
        self.read().entries.contains_key(&tag)
    }

    /// Get tags that have registered types.
    pub fn tags(&self) -> Vec<u8> {
        let mut tags: Vec<u8> = self.read().entries.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Encode `message` with its registered encoder, returning `(tag, body)`.
    pub fn encode<M: MeshMessage>(&self, message: &M) -> Result<(u8, Vec<u8>)> {
        let type_name = type_name::<M>();
        let (tag, encode) = {
            let table = self.read();
            let tag = *table
                .tags_by_type
                .get(&TypeId::of::<M>())
                .ok_or(DispatchError::UnregisteredType { type_name })?;
            let entry = table
                .entries
                .get(&tag)
                .ok_or(DispatchError::UnregisteredType { type_name })?;
            (tag, Arc::clone(&entry.encode))
        };

        let body = encode(message as &(dyn Any + Send)).map_err(|source| DispatchError::Encode {
            tag,
            type_name,
            source,
        })?;
        Ok((tag, body))
    }

    /// Open a new subscription for `M`.
    pub fn subscribe<M: MeshMessage>(&self) -> Result<Subscription<M>> {
        let mut table = self.write();
        if table.closed {
            return Err(DispatchError::Closed);
        }
        let tag = *table
            .tags_by_type
            .get(&TypeId::of::<M>())
            .ok_or(DispatchError::UnregisteredType {
                type_name: type_name::<M>(),
            })?;
        let entry = table
            .entries
            .get_mut(&tag)
            .ok_or(DispatchError::UnregisteredType {
                type_name: type_name::<M>(),
            })?;

        entry.subscribers.retain(|sink| !sink.is_closed());
        let queue = Queue::<M>::new(self.config.queue_capacity);
        entry.subscribers.push(Arc::clone(&queue) as Arc<dyn Sink>);
        debug!(
            tag,
            subscribers = entry.subscribers.len(),
            "opened typed subscription"
        );
        Ok(Subscription::new(queue))
    }

    /// Open a new subscription for raw (tag 0) payloads.
    pub fn subscribe_raw(&self) -> Result<Subscription<Bytes>> {
        let mut table = self.write();
        if table.closed {
            return Err(DispatchError::Closed);
        }
        table.raw.retain(|queue| !queue.is_closed());
        let queue = Queue::<Bytes>::new(self.config.queue_capacity);
        table.raw.push(Arc::clone(&queue));
        debug!(subscribers = table.raw.len(), "opened raw subscription");
        Ok(Subscription::new(queue))
    }

    /// Fan a frame out to every matching subscription.
    ///
    /// Decode failures and unknown tags are logged and the frame dropped;
    /// they never reach subscribers.
    pub fn dispatch(&self, frame: Frame) -> DispatchOutcome {
        let tag = frame.tag;
        if tag == RAW {
            return self.dispatch_raw(frame.payload);
        }

        let (type_name, decode, subscribers) = {
            let table = self.read();
            let Some(entry) = table.entries.get(&tag) else {
                warn!(tag, size = frame.payload.len(), "dropping frame for unregistered tag");
                return DispatchOutcome::UnknownTag { tag };
            };
            let open: Vec<Arc<dyn Sink>> = entry
                .subscribers
                .iter()
                .filter(|sink| !sink.is_closed())
                .cloned()
                .collect();
            (entry.type_name, Arc::clone(&entry.decode), open)
        };

        if subscribers.is_empty() {
            trace!(tag, "no subscribers for frame");
            return DispatchOutcome::NoSubscribers { tag };
        }

        let message = match decode(&frame.payload) {
            Ok(message) => message,
            Err(source) => {
                let err = DispatchError::Decode {
                    tag,
                    type_name,
                    source,
                };
                warn!(tag, error = %err, "dropping undecodable frame");
                return DispatchOutcome::DecodeFailed { tag };
            }
        };

        let mut receivers = 0usize;
        let mut stale = false;
        for sink in &subscribers {
            let delivery = sink.deliver(&*message);
            if delivery.is_delivered() {
                receivers += 1;
            } else {
                stale = true;
            }
        }
        if stale {
            self.prune(tag);
        }

        trace!(tag, receivers, "dispatched typed frame");
        DispatchOutcome::Delivered { tag, receivers }
    }

    fn dispatch_raw(&self, payload: Bytes) -> DispatchOutcome {
        let queues: Vec<Arc<Queue<Bytes>>> = self.read().raw.to_vec();
        let mut receivers = 0usize;
        let mut stale = false;
        for queue in &queues {
            if queue.push(payload.clone()).is_delivered() {
                receivers += 1;
            } else {
                stale = true;
            }
        }
        if stale {
            self.write().raw.retain(|queue| !queue.is_closed());
        }
        if receivers == 0 {
            trace!("no raw subscribers for frame");
            return DispatchOutcome::NoSubscribers { tag: RAW };
        }
        trace!(receivers, "dispatched raw frame");
        DispatchOutcome::Delivered {
            tag: RAW,
            receivers,
        }
    }

    fn prune(&self, tag: u8) {
        if let Some(entry) = self.write().entries.get_mut(&tag) {
            entry.subscribers.retain(|sink| !sink.is_closed());
        }
    }

    /// Number of open subscriptions for a tag (tag 0 counts raw ones).
    ///
    /// Dropped subscriptions are excluded immediately, but their fan-out
    /// slots are only reclaimed by the next `subscribe` or `dispatch` on the
    /// same tag. Subscribe/drop churn therefore leaves at most one dead slot
    /// per tag.
    pub fn subscriber_count(&self, tag: u8) -> usize {
        let table = self.read();
        if tag == RAW {
            return table.raw.iter().filter(|queue| !queue.is_closed()).count();
        }
        table
            .entries
            .get(&tag)
            .map(|entry| {
                entry
                    .subscribers
                    .iter()
                    .filter(|sink| !sink.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Close every subscription and refuse new ones.
    ///
    /// Consumers blocked on a closed subscription observe the end of their
    /// sequence.
    pub fn close_all(&self) {
        let (typed, raw) = {
            let mut table = self.write();
            table.closed = true;
            let typed: Vec<Arc<dyn Sink>> = table
                .entries
                .values_mut()
                .flat_map(|entry| entry.subscribers.drain(..))
                .collect();
            let raw = std::mem::take(&mut table.raw);
            (typed, raw)
        };

        debug!(
            typed = typed.len(),
            raw = raw.len(),
            "closing all subscriptions"
        );
        for sink in typed {
            sink.close();
        }
        for queue in raw {
            queue.close();
        }
    }

    /// True once [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Get registry configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
