//! ## driftnet-protocols::ipfix
//! **IPFIX message framing (RFC 7011)**
//!
//! A message is a 16-byte header followed by sets. Template and options
//! template sets feed the [`TemplateCache`]; data sets are decoded against
//! the cached template of the same exporter and observation domain.
//!
//! Failure scope is as narrow as the framing allows: a bad header rejects
//! the datagram, a bad set header ends the walk over the message, a bad
//! record ends its set. Records decoded before a failure are kept.
//!
//! Datagrams are untrusted. The cache is bounded by [`TemplateLimits`] and a
//! message never yields more values than it has bytes, which zero-length
//! fields would otherwise allow.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use driftnet_core::Connection;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::cursor::{Cursor, Underrun};
use crate::error::{DecodeError, DecodeErrorKind, MessageError, TemplateRejected};
use crate::record::{PacketDecoder, PacketOutcome, Record, RecordOrigin};
use crate::registry::Registry;
use crate::template::{read_field_specifier, BoundTemplate, Template};

pub const IPFIX_VERSION: u16 = 10;
pub const HEADER_LEN: usize = 16;
pub const SET_HEADER_LEN: usize = 4;
pub const TEMPLATE_SET_ID: u16 = 2;
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
pub const MIN_DATA_SET_ID: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub length: u16,
    pub export_time: u32,
    pub sequence: u32,
    pub observation_domain: u32,
}

impl MessageHeader {
    /// Parses the header and returns a cursor over the sets it frames.
    /// Bytes past the declared length are ignored.
    pub fn parse(buf: &[u8]) -> Result<(Self, Cursor<'_>), MessageError> {
        let mut cursor = Cursor::new(buf);
        let version = cursor.read_u16()?;
        if version != IPFIX_VERSION {
            return Err(MessageError::Version(version));
        }
        let length = cursor.read_u16()?;
        let export_time = cursor.read_u32()?;
        let sequence = cursor.read_u32()?;
        let observation_domain = cursor.read_u32()?;

        let declared = usize::from(length);
        if declared < HEADER_LEN || declared > buf.len() {
            return Err(MessageError::Length {
                declared,
                actual: buf.len(),
            });
        }
        let sets = cursor.sub_cursor(declared - HEADER_LEN)?;

        let header = Self {
            version,
            length,
            export_time,
            sequence,
            observation_domain,
        };
        Ok((header, sets))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TemplateKey {
    exporter: SocketAddr,
    domain: u32,
    template_id: u16,
}

/// Bounds on what a [`TemplateCache`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateLimits {
    /// Field specifiers across every cached template. The oldest templates
    /// are evicted to make room for new ones.
    pub max_fields: usize,
    /// Templates one exporter address may have cached. Further definitions
    /// are refused until some are withdrawn or evicted.
    pub max_per_exporter: usize,
}

impl Default for TemplateLimits {
    fn default() -> Self {
        Self {
            max_fields: 1 << 20,
            max_per_exporter: 4096,
        }
    }
}

#[derive(Debug)]
struct Cached {
    template: Arc<BoundTemplate>,
    generation: u64,
}

#[derive(Debug, Default)]
struct Entries {
    templates: HashMap<TemplateKey, Cached>,
    /// Learning order. An entry whose generation no longer matches the map
    /// was withdrawn or replaced and is skipped.
    order: VecDeque<(TemplateKey, u64)>,
    per_exporter: HashMap<SocketAddr, usize>,
    fields: usize,
    next_generation: u64,
}

impl Entries {
    fn is_current(&self, key: &TemplateKey, generation: u64) -> bool {
        self.templates
            .get(key)
            .is_some_and(|cached| cached.generation == generation)
    }

    fn remove(&mut self, key: &TemplateKey) -> Option<Arc<BoundTemplate>> {
        let cached = self.templates.remove(key)?;
        self.fields -= cached.template.field_count();
        if let Some(count) = self.per_exporter.get_mut(&key.exporter) {
            *count -= 1;
            if *count == 0 {
                self.per_exporter.remove(&key.exporter);
            }
        }
        Some(cached.template)
    }

    /// Evicts oldest first until at most `budget` fields remain.
    fn evict_to(&mut self, budget: usize) -> usize {
        let mut evicted = 0;
        while self.fields > budget {
            let Some((key, generation)) = self.order.pop_front() else {
                break;
            };
            if self.is_current(&key, generation) {
                self.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }

    fn push(&mut self, key: TemplateKey, template: Arc<BoundTemplate>) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.fields += template.field_count();
        *self.per_exporter.entry(key.exporter).or_insert(0) += 1;
        self.templates.insert(key, Cached { template, generation });
        self.order.push_back((key, generation));

        if self.order.len() > 2 * self.templates.len() + 64 {
            let templates = &self.templates;
            self.order.retain(|(key, generation)| {
                templates
                    .get(key)
                    .is_some_and(|cached| cached.generation == *generation)
            });
        }
    }
}

/// Templates scoped to (exporter, observation domain, template id), shared
/// by all decoding workers.
#[derive(Debug, Default)]
pub struct TemplateCache {
    limits: TemplateLimits,
    entries: RwLock<Entries>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: TemplateLimits) -> Self {
        Self {
            limits,
            entries: RwLock::default(),
        }
    }

    pub fn limits(&self) -> TemplateLimits {
        self.limits
    }

    pub fn get(&self, exporter: SocketAddr, domain: u32, template_id: u16) -> Option<Arc<BoundTemplate>> {
        let key = TemplateKey {
            exporter,
            domain,
            template_id,
        };
        self.entries
            .read()
            .templates
            .get(&key)
            .map(|cached| Arc::clone(&cached.template))
    }

    /// Stores `template`, returning the definition it replaced. Older
    /// templates of any exporter may be evicted to stay within
    /// [`TemplateLimits::max_fields`].
    pub fn insert(
        &self,
        exporter: SocketAddr,
        domain: u32,
        template: BoundTemplate,
    ) -> Result<Option<Arc<BoundTemplate>>, TemplateRejected> {
        let fields = template.field_count();
        let limit = self.limits.max_fields;
        if fields > limit {
            return Err(TemplateRejected::TooLarge { fields, limit });
        }

        let key = TemplateKey {
            exporter,
            domain,
            template_id: template.template().id,
        };
        let mut entries = self.entries.write();
        let known = entries.per_exporter.get(&exporter).copied().unwrap_or(0);
        if !entries.templates.contains_key(&key) && known >= self.limits.max_per_exporter {
            return Err(TemplateRejected::ExporterFull {
                limit: self.limits.max_per_exporter,
            });
        }

        let previous = entries.remove(&key);
        let evicted = entries.evict_to(limit - fields);
        if evicted > 0 {
            debug!(evicted, cached = entries.templates.len(), "Evicted oldest templates");
        }
        entries.push(key, Arc::new(template));
        Ok(previous)
    }

    pub fn withdraw(&self, exporter: SocketAddr, domain: u32, template_id: u16) -> bool {
        let key = TemplateKey {
            exporter,
            domain,
            template_id,
        };
        self.entries.write().remove(&key).is_some()
    }

    /// Drops every template (or every options template) of one domain.
    pub fn withdraw_all(&self, exporter: SocketAddr, domain: u32, options: bool) -> usize {
        let mut entries = self.entries.write();
        let keys: Vec<TemplateKey> = entries
            .templates
            .iter()
            .filter(|(key, cached)| {
                key.exporter == exporter
                    && key.domain == domain
                    && cached.template.template().is_options() == options
            })
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().templates.is_empty()
    }

    /// Field specifiers held across all cached templates.
    pub fn field_count(&self) -> usize {
        self.entries.read().fields
    }
}

enum TemplateRecord {
    Define(Template),
    Withdraw(u16),
}

fn framing_underrun(underrun: Underrun) -> DecodeError {
    DecodeError::underrun(None, underrun)
}

fn read_set<'a>(cursor: &mut Cursor<'a>) -> Result<(u16, Cursor<'a>), DecodeError> {
    let start = cursor.offset();
    let set_id = cursor.read_u16().map_err(framing_underrun)?;
    let length = usize::from(cursor.read_u16().map_err(framing_underrun)?);
    let body_len = length.checked_sub(SET_HEADER_LEN).ok_or_else(|| {
        DecodeError::malformed(None, start, length, "set length shorter than its header")
    })?;
    let body = cursor.sub_cursor(body_len).map_err(framing_underrun)?;
    Ok((set_id, body))
}

fn read_template(set_id: u16, cursor: &mut Cursor<'_>) -> Result<TemplateRecord, DecodeError> {
    let start = cursor.offset();
    let template_id = cursor.read_u16().map_err(framing_underrun)?;
    let field_count = cursor.read_u16().map_err(framing_underrun)?;
    if field_count == 0 {
        return Ok(TemplateRecord::Withdraw(template_id));
    }
    if template_id < MIN_DATA_SET_ID {
        return Err(DecodeError::malformed(
            None,
            start,
            SET_HEADER_LEN,
            format!("template id {template_id} is reserved"),
        ));
    }

    let scope_field_count = if set_id == OPTIONS_TEMPLATE_SET_ID {
        let scope = cursor.read_u16().map_err(framing_underrun)?;
        if scope == 0 || scope > field_count {
            return Err(DecodeError::malformed(
                None,
                start,
                SET_HEADER_LEN + 2,
                format!("scope field count {scope} outside 1..={field_count}"),
            ));
        }
        scope
    } else {
        0
    };

    let fields = (0..field_count)
        .map(|_| read_field_specifier(cursor).map_err(framing_underrun))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TemplateRecord::Define(Template {
        id: template_id,
        scope_field_count,
        fields,
    }))
}

pub struct IpfixDecoder {
    registry: Arc<Registry>,
    templates: TemplateCache,
}

impl IpfixDecoder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_limits(registry, TemplateLimits::default())
    }

    pub fn with_limits(registry: Arc<Registry>, limits: TemplateLimits) -> Self {
        Self {
            registry,
            templates: TemplateCache::with_limits(limits),
        }
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    fn learn_templates(
        &self,
        exporter: SocketAddr,
        domain: u32,
        set_id: u16,
        mut set: Cursor<'_>,
        outcome: &mut PacketOutcome,
    ) {
        // A tail shorter than a record header is padding.
        while set.remaining() >= SET_HEADER_LEN {
            let start = set.offset();
            match read_template(set_id, &mut set) {
                Ok(TemplateRecord::Define(template)) => {
                    let (template_id, fields, options) =
                        (template.id, template.fields.len(), template.is_options());
                    let bound = BoundTemplate::bind(template, &self.registry);
                    match self.templates.insert(exporter, domain, bound) {
                        Ok(_) => debug!(
                            exporter = %exporter,
                            domain,
                            template_id,
                            fields,
                            options,
                            "Template learned"
                        ),
                        Err(rejected) => outcome.failures.push(DecodeError::limit_exceeded(
                            start,
                            set.offset() - start,
                            format!("template {template_id}: {rejected}"),
                        )),
                    }
                }
                Ok(TemplateRecord::Withdraw(template_id)) if template_id == set_id => {
                    let removed = self.templates.withdraw_all(
                        exporter,
                        domain,
                        set_id == OPTIONS_TEMPLATE_SET_ID,
                    );
                    debug!(exporter = %exporter, domain, removed, "All templates withdrawn");
                }
                Ok(TemplateRecord::Withdraw(template_id)) => {
                    if self.templates.withdraw(exporter, domain, template_id) {
                        debug!(exporter = %exporter, domain, template_id, "Template withdrawn");
                    }
                }
                Err(err) => {
                    outcome.failures.push(err);
                    break;
                }
            }
        }
    }

    fn decode_data_set(
        &self,
        connection: &Connection,
        header: &MessageHeader,
        set_id: u16,
        mut set: Cursor<'_>,
        value_budget: &mut usize,
        outcome: &mut PacketOutcome,
    ) {
        let set_start = set.offset() - SET_HEADER_LEN;
        let set_length = set.remaining() + SET_HEADER_LEN;
        let Some(template) = self
            .templates
            .get(connection.source(), header.observation_domain, set_id)
        else {
            outcome.failures.push(DecodeError::new(
                None,
                set_start,
                set_length,
                DecodeErrorKind::MissingTemplate {
                    template_id: set_id,
                },
            ));
            return;
        };

        let min = template.template().min_record_length();
        if min == 0 {
            outcome.failures.push(DecodeError::malformed(
                None,
                set_start,
                set_length,
                format!("template {set_id} describes zero-length records"),
            ));
            return;
        }

        let origin = RecordOrigin::Ipfix {
            observation_domain: header.observation_domain,
            template_id: set_id,
            export_time: header.export_time,
            sequence: header.sequence,
        };

        while set.remaining() >= min {
            if template.field_count() > *value_budget {
                outcome.failures.push(DecodeError::limit_exceeded(
                    set.offset(),
                    set.remaining(),
                    format!("template {set_id} yields more values than the message has bytes"),
                ));
                break;
            }
            match template.decode(&self.registry, &mut set) {
                Ok(values) => {
                    *value_budget -= values.len();
                    outcome.records.push(Record {
                        source: connection.source(),
                        received_at: connection.received_at(),
                        origin,
                        values,
                    });
                }
                Err(err) => {
                    outcome.failures.push(err);
                    break;
                }
            }
        }
    }
}

impl PacketDecoder for IpfixDecoder {
    fn protocol(&self) -> &'static str {
        "ipfix"
    }

    fn decode(&self, connection: &Connection) -> PacketOutcome {
        let (header, mut sets) = match MessageHeader::parse(connection.payload()) {
            Ok(parsed) => parsed,
            Err(err) => return PacketOutcome::failed(err.into()),
        };
        trace!(
            exporter = %connection.source(),
            domain = header.observation_domain,
            sequence = header.sequence,
            "IPFIX message"
        );

        let mut outcome = PacketOutcome::default();
        // Every value must be paid for with at least one byte of the message.
        let mut value_budget = connection.payload().len();
        while !sets.is_empty() {
            let set_start = sets.offset();
            let (set_id, set) = match read_set(&mut sets) {
                Ok(set) => set,
                Err(err) => {
                    outcome.failures.push(err);
                    break;
                }
            };
            match set_id {
                TEMPLATE_SET_ID | OPTIONS_TEMPLATE_SET_ID => self.learn_templates(
                    connection.source(),
                    header.observation_domain,
                    set_id,
                    set,
                    &mut outcome,
                ),
                id if id >= MIN_DATA_SET_ID => self.decode_data_set(
                    connection,
                    &header,
                    id,
                    set,
                    &mut value_budget,
                    &mut outcome,
                ),
                reserved => debug!(set_id = reserved, offset = set_start, "Skipping reserved set"),
            }
        }
        outcome
    }
}
