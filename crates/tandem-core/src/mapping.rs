//! # Source → Mirror Mapping
//!
//! System A stores location and status as free text; System B uses fixed
//! enumerations. The same mapping is used by the propagator (to write the
//! mirror) and by the conflict detector (to compare both sides), so a value
//! that was just synced never shows up as a mismatch.
//!
//! ## Zone Resolution
//! ```text
//! location: "Unit 4, Airport Road"
//!              │ lowercase
//!              ▼
//!   keyword hits: "airport" (east, 7 chars), "port" (coastal, 4 chars)
//!              │ longest wins
//!              ▼
//!   Zone::East                      (no hit at all → Zone::Unassigned)
//! ```
//!
//! ## Status Resolution
//! Labels are normalised (trim, lowercase, spaces/hyphens → `_`) and looked
//! up in a fixed table. Unknown labels fall back to `active`; callers log the
//! fallback as a data warning, it is never fatal.

use crate::error::{CoreError, CoreResult};
use crate::types::{AgentStatus, MirrorAgentDraft, SourceAgent, Zone};

// =============================================================================
// Zone Table
// =============================================================================

/// Built-in keyword table. Keywords are matched as substrings of the
/// lowercased location.
const BUILTIN_ZONE_KEYWORDS: &[(&str, Zone)] = &[
    ("downtown", Zone::Central),
    ("city centre", Zone::Central),
    ("city center", Zone::Central),
    ("cbd", Zone::Central),
    ("central", Zone::Central),
    ("old town", Zone::Central),
    ("north", Zone::North),
    ("uptown", Zone::North),
    ("hillside", Zone::North),
    ("south", Zone::South),
    ("riverside", Zone::South),
    ("industrial area", Zone::South),
    ("east", Zone::East),
    ("airport", Zone::East),
    ("west", Zone::West),
    ("lakeside", Zone::West),
    ("coast", Zone::Coastal),
    ("port", Zone::Coastal),
    ("harbour", Zone::Coastal),
    ("harbor", Zone::Coastal),
    ("beach", Zone::Coastal),
    ("marina", Zone::Coastal),
];

/// Keyword → zone lookup with longest-match semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTable {
    entries: Vec<(String, Zone)>,
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ZoneTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        ZoneTable {
            entries: BUILTIN_ZONE_KEYWORDS
                .iter()
                .map(|(k, z)| (k.to_string(), *z))
                .collect(),
        }
    }

    /// Returns the built-in table extended with configured entries.
    ///
    /// An override for an existing keyword replaces its zone. The result is
    /// validated before it is returned.
    pub fn with_overrides<I>(overrides: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (String, Zone)>,
    {
        let mut table = Self::builtin();
        for (keyword, zone) in overrides {
            let keyword = keyword.trim().to_lowercase();
            match table.entries.iter_mut().find(|(k, _)| *k == keyword) {
                Some(existing) => existing.1 = zone,
                None => table.entries.push((keyword, zone)),
            }
        }
        table.validate()?;
        Ok(table)
    }

    /// Startup validation.
    ///
    /// - keywords are non-empty, trimmed and lowercase
    /// - no keyword appears twice
    /// - no keyword maps to `Unassigned` (that is the fallback, not a target)
    pub fn validate(&self) -> CoreResult<()> {
        let mut seen = std::collections::HashSet::new();
        for (keyword, zone) in &self.entries {
            if keyword.is_empty() {
                return Err(CoreError::InvalidMappingTable("empty keyword".into()));
            }
            if keyword != &keyword.trim().to_lowercase() {
                return Err(CoreError::InvalidMappingTable(format!(
                    "keyword '{}' must be trimmed lowercase",
                    keyword
                )));
            }
            if *zone == Zone::Unassigned {
                return Err(CoreError::InvalidMappingTable(format!(
                    "keyword '{}' maps to the fallback zone",
                    keyword
                )));
            }
            if !seen.insert(keyword.as_str()) {
                return Err(CoreError::InvalidMappingTable(format!(
                    "duplicate keyword '{}'",
                    keyword
                )));
            }
        }
        Ok(())
    }

    /// Resolves a free-text location.
    ///
    /// Returns `None` when no keyword matches; [`ZoneTable::zone_for`] applies
    /// the default.
    pub fn lookup(&self, location: &str) -> Option<Zone> {
        let haystack = location.to_lowercase();
        let mut best: Option<(&str, Zone)> = None;

        for (keyword, zone) in &self.entries {
            if !haystack.contains(keyword.as_str()) {
                continue;
            }
            // Strictly longer only: ties keep table order.
            let better = best.map_or(true, |(k, _)| keyword.len() > k.len());
            if better {
                best = Some((keyword.as_str(), *zone));
            }
        }

        best.map(|(_, zone)| zone)
    }

    /// Resolves a location, falling back to [`Zone::Unassigned`].
    pub fn zone_for(&self, location: &str) -> Zone {
        self.lookup(location).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Status Table
// =============================================================================

/// Result of mapping a source status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMapping {
    pub status: AgentStatus,
    /// False when the label was unknown and the default was applied.
    pub recognized: bool,
}

/// Source labels accepted for each mirror status.
const STATUS_LABELS: &[(&str, AgentStatus)] = &[
    ("active", AgentStatus::Active),
    ("available", AgentStatus::Active),
    ("online", AgentStatus::Active),
    ("inactive", AgentStatus::Inactive),
    ("offline", AgentStatus::Inactive),
    ("disabled", AgentStatus::Inactive),
    ("deactivated", AgentStatus::Inactive),
    ("terminated", AgentStatus::Inactive),
    ("on_delivery", AgentStatus::OnDelivery),
    ("delivering", AgentStatus::OnDelivery),
    ("in_transit", AgentStatus::OnDelivery),
    ("busy", AgentStatus::OnDelivery),
    ("on_break", AgentStatus::OnBreak),
    ("break", AgentStatus::OnBreak),
    ("paused", AgentStatus::OnBreak),
    ("suspended", AgentStatus::Suspended),
    ("banned", AgentStatus::Suspended),
    ("blocked", AgentStatus::Suspended),
    ("training", AgentStatus::Training),
    ("in_training", AgentStatus::Training),
    ("onboarding", AgentStatus::Training),
];

fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Maps a free-text source status onto [`AgentStatus`].
pub fn map_status(raw: &str) -> StatusMapping {
    let label = normalize_label(raw);
    STATUS_LABELS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, status)| StatusMapping {
            status: *status,
            recognized: true,
        })
        .unwrap_or(StatusMapping {
            status: AgentStatus::default(),
            recognized: false,
        })
}

/// Returns true when the source label denotes suspension.
pub fn is_source_suspended(raw: &str) -> bool {
    let mapping = map_status(raw);
    mapping.recognized && mapping.status == AgentStatus::Suspended
}

/// Startup validation: every [`AgentStatus`] is reachable from some label.
pub fn validate_status_table() -> CoreResult<()> {
    let all = [
        AgentStatus::Active,
        AgentStatus::Inactive,
        AgentStatus::OnDelivery,
        AgentStatus::OnBreak,
        AgentStatus::Suspended,
        AgentStatus::Training,
    ];
    for status in all {
        if !STATUS_LABELS.iter().any(|(_, s)| *s == status) {
            return Err(CoreError::InvalidMappingTable(format!(
                "status '{}' has no source label",
                status
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Agent Projection
// =============================================================================

/// Notes about fallbacks applied while projecting an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionNotes {
    pub zone_matched: bool,
    pub status_recognized: bool,
}

/// Projects a SourceAgent onto the fields System B stores.
pub fn project_agent(source: &SourceAgent, zones: &ZoneTable) -> (MirrorAgentDraft, ProjectionNotes) {
    let zone = zones.lookup(&source.location);
    let status = map_status(&source.status);

    let draft = MirrorAgentDraft {
        external_id: source.id,
        name: source.name.trim().to_string(),
        zone: zone.unwrap_or_default(),
        status: status.status,
        performance_score: source.rating.clamp(0.0, 5.0),
        compliance_score: source.compliance_score.clamp(0, 100),
        allocation_restricted: source.allocation_restricted,
    };

    let notes = ProjectionNotes {
        zone_matched: zone.is_some(),
        status_recognized: status.recognized,
    };

    (draft, notes)
}
