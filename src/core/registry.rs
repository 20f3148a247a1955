use tracing::{debug, warn};

use crate::channel::{ChannelArena, ChannelId, ChannelKind};

/// Request value meaning "every channel of this kind".
pub const BIND_ALL: &str = "ALL";

/// Parsed form of a requested channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequest {
    BindAll,
    Named(Vec<String>),
}

impl ChannelRequest {
    /// `"ALL"` anywhere in the list (any case) wins over the other entries.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut named = Vec::new();
        for name in names {
            let name = name.as_ref();
            if name.eq_ignore_ascii_case(BIND_ALL) {
                return Self::BindAll;
            }
            named.push(name.to_string());
        }
        Self::Named(named)
    }
}

/// What a bind pass resolved and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    pub bound: Vec<ChannelId>,
    pub skipped: Vec<String>,
}

impl BindReport {
    pub fn merge(&mut self, other: BindReport) {
        self.bound.extend(other.bound);
        self.skipped.extend(other.skipped);
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Ordered, de-duplicated set of channels of one kind that a controller
/// reads from.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    kind: ChannelKind,
    requested: Vec<String>,
    request: ChannelRequest,
    bound: Vec<ChannelId>,
}

impl ChannelRegistry {
    pub fn new<I, S>(kind: ChannelKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        let request = ChannelRequest::from_names(&requested);
        Self {
            kind,
            requested,
            request,
            bound: Vec::new(),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// The names exactly as configured, sentinel included.
    pub fn requested_names(&self) -> &[String] {
        &self.requested
    }

    pub fn request(&self) -> &ChannelRequest {
        &self.request
    }

    pub fn bound(&self) -> &[ChannelId] {
        &self.bound
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    pub fn clear(&mut self) {
        self.bound.clear();
    }

    /// Bind one channel directly. Returns false if it is already bound, of
    /// another kind, or unknown.
    pub fn add_channel(&mut self, arena: &ChannelArena, id: ChannelId) -> bool {
        let Some(channel) = arena.get(id) else {
            return false;
        };
        if channel.kind() != self.kind {
            return false;
        }
        // Identity is the channel name; ids are unique per name in an arena.
        let duplicate = self
            .bound
            .iter()
            .any(|&b| arena.get(b).is_some_and(|c| c.name() == channel.name()));
        if duplicate {
            return false;
        }
        self.bound.push(id);
        true
    }

    /// Resolve the request against `arena`.
    ///
    /// Names that match nothing (or match a channel of another kind) are
    /// logged and skipped; binding what can be bound is never an error.
    pub fn bind(&mut self, arena: &ChannelArena) -> BindReport {
        let mut report = BindReport::default();

        match self.request.clone() {
            ChannelRequest::BindAll => {
                let ids: Vec<ChannelId> = arena
                    .iter()
                    .filter(|(_, c)| c.kind() == self.kind)
                    .map(|(id, _)| id)
                    .collect();
                for id in ids {
                    if self.add_channel(arena, id) {
                        report.bound.push(id);
                    }
                }
            }
            ChannelRequest::Named(names) => {
                for name in names {
                    let hit = arena
                        .iter()
                        .find(|(_, c)| c.kind() == self.kind && c.name() == name)
                        .map(|(id, _)| id);
                    match hit {
                        Some(id) => {
                            if self.add_channel(arena, id) {
                                report.bound.push(id);
                            }
                        }
                        None => {
                            warn!(
                                channel = %name,
                                kind = self.kind.label(),
                                "requested channel not found; skipping"
                            );
                            report.skipped.push(name);
                        }
                    }
                }
            }
        }

        debug!(
            kind = self.kind.label(),
            bound = self.bound.len(),
            skipped = report.skipped.len(),
            "registry bound"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DelayElement, StretchVelocitySensor, TendonLengthSensor};

    fn arena() -> ChannelArena {
        let mut arena = ChannelArena::new();
        arena
            .add(StretchVelocitySensor::new("spindle_sol", "soleus", 1.0, 0.0).unwrap())
            .unwrap();
        arena
            .add(TendonLengthSensor::new("gto_sol", "soleus", 0.0).unwrap())
            .unwrap();
        arena
            .add(StretchVelocitySensor::new("spindle_ta", "tib_ant", 1.0, 0.0).unwrap())
            .unwrap();
        arena
            .add(DelayElement::new("efferent", "soleus", 0.03).unwrap())
            .unwrap();
        arena
    }

    #[test]
    fn request_parsing() {
        assert_eq!(
            ChannelRequest::from_names(Vec::<String>::new()),
            ChannelRequest::Named(vec![])
        );
        assert_eq!(ChannelRequest::from_names(["a", "all", "b"]), ChannelRequest::BindAll);
        assert_eq!(ChannelRequest::from_names(["All"]), ChannelRequest::BindAll);
        assert_eq!(
            ChannelRequest::from_names(["a", "b"]),
            ChannelRequest::Named(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn empty_request_binds_nothing() {
        let arena = arena();
        let mut reg = ChannelRegistry::new(ChannelKind::StretchVelocity, Vec::<String>::new());
        let report = reg.bind(&arena);
        assert!(reg.is_empty());
        assert!(report.bound.is_empty() && report.skipped.is_empty());
    }

    #[test]
    fn bind_all_takes_every_channel_of_the_kind() {
        let arena = arena();
        let mut reg = ChannelRegistry::new(ChannelKind::StretchVelocity, ["spindle_ta", "ALL"]);
        reg.bind(&arena);
        assert_eq!(reg.bound(), &[0, 2]);
        assert_eq!(reg.requested_names(), &["spindle_ta".to_string(), "ALL".to_string()]);
    }

    #[test]
    fn bind_all_is_idempotent() {
        let arena = arena();
        let mut reg = ChannelRegistry::new(ChannelKind::TendonLength, ["all"]);
        reg.bind(&arena);
        let second = reg.bind(&arena);
        assert_eq!(reg.bound(), &[1]);
        assert!(second.bound.is_empty());
    }

    #[test]
    fn unknown_names_are_skipped() {
        let arena = arena();
        let mut reg = ChannelRegistry::new(
            ChannelKind::StretchVelocity,
            ["spindle_ta", "spindle_gas", "spindle_sol"],
        );
        let report = reg.bind(&arena);
        assert_eq!(reg.bound(), &[2, 0]);
        assert_eq!(report.skipped, vec!["spindle_gas".to_string()]);
        assert!(!report.is_complete());
    }

    #[test]
    fn names_of_another_kind_do_not_match() {
        let arena = arena();
        let mut reg = ChannelRegistry::new(ChannelKind::StretchVelocity, ["gto_sol", "efferent"]);
        let report = reg.bind(&arena);
        assert!(reg.is_empty());
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn add_channel_deduplicates() {
        let arena = arena();
        let mut reg = ChannelRegistry::new(ChannelKind::TendonLength, ["gto_sol"]);
        assert!(reg.add_channel(&arena, 1));
        assert!(!reg.add_channel(&arena, 1));
        assert!(!reg.add_channel(&arena, 0));
        reg.bind(&arena);
        assert_eq!(reg.len(), 1);
    }
}
