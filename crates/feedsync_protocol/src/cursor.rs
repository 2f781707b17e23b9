//! Pagination cursors.
//!
//! A [`Cursor`] describes where the next page should start. It is rendered
//! into transport-agnostic query parameters by [`Cursor::build`], with the
//! requested limit passed through a per-call-site clamp.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Query parameter name for the upper-bound id.
const MAX_ID: &str = "max_id";
/// Query parameter name for the exclusive lower-bound id.
const SINCE_ID: &str = "since_id";
/// Query parameter name for the adjacent lower-bound id.
const MIN_ID: &str = "min_id";
/// Query parameter name for the page size.
const LIMIT: &str = "limit";

/// Parses an item id as an integer for ordering purposes.
///
/// Ids that do not parse (including empty strings) are treated as `0`.
/// Two distinct non-numeric ids therefore order as equal.
pub fn numeric_id(id: &str) -> i64 {
    id.parse::<i64>().unwrap_or(0)
}

/// The kind tag of a [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    /// Items with ids below a bound (older content).
    UpperBound,
    /// Items with ids strictly above a bound, newest first.
    LowerBoundSince,
    /// Items immediately above a bound, oldest first on the server side.
    LowerBoundMin,
    /// A bare page size.
    Limit,
    /// No parameters at all.
    Default,
}

impl CursorKind {
    /// Returns a stable lowercase name for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorKind::UpperBound => "upper_bound",
            CursorKind::LowerBoundSince => "lower_bound_since",
            CursorKind::LowerBoundMin => "lower_bound_min",
            CursorKind::Limit => "limit",
            CursorKind::Default => "default",
        }
    }
}

impl fmt::Display for CursorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pagination request descriptor.
///
/// Cursors are immutable. Two cursors can be ordered against each other
/// only when they are of the same id-bearing kind; see
/// [`Cursor::is_comparable_with`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cursor {
    /// Gets items with ids less than `id`.
    UpperBound {
        /// Boundary item id.
        id: String,
        /// Requested page size, if any.
        limit: Option<u32>,
    },
    /// Gets items with ids greater than `id`.
    LowerBoundSince {
        /// Boundary item id.
        id: String,
        /// Requested page size, if any.
        limit: Option<u32>,
    },
    /// Gets items immediately newer than `id`.
    LowerBoundMin {
        /// Boundary item id.
        id: String,
        /// Requested page size, if any.
        limit: Option<u32>,
    },
    /// Sets only the page size.
    Limit {
        /// Requested page size.
        n: u32,
    },
    /// Applies the source's default values.
    Default,
}

impl Cursor {
    /// Creates an upper-bound cursor.
    pub fn upper_bound(id: impl Into<String>, limit: Option<u32>) -> Self {
        Cursor::UpperBound {
            id: id.into(),
            limit,
        }
    }

    /// Creates a "since" lower-bound cursor.
    pub fn since(id: impl Into<String>, limit: Option<u32>) -> Self {
        Cursor::LowerBoundSince {
            id: id.into(),
            limit,
        }
    }

    /// Creates a "min" lower-bound cursor.
    pub fn min(id: impl Into<String>, limit: Option<u32>) -> Self {
        Cursor::LowerBoundMin {
            id: id.into(),
            limit,
        }
    }

    /// Creates a limit-only cursor.
    pub fn limit(n: u32) -> Self {
        Cursor::Limit { n }
    }

    /// Returns the kind tag.
    pub fn kind(&self) -> CursorKind {
        match self {
            Cursor::UpperBound { .. } => CursorKind::UpperBound,
            Cursor::LowerBoundSince { .. } => CursorKind::LowerBoundSince,
            Cursor::LowerBoundMin { .. } => CursorKind::LowerBoundMin,
            Cursor::Limit { .. } => CursorKind::Limit,
            Cursor::Default => CursorKind::Default,
        }
    }

    /// Returns the boundary id for id-bearing cursors.
    pub fn id(&self) -> Option<&str> {
        match self {
            Cursor::UpperBound { id, .. }
            | Cursor::LowerBoundSince { id, .. }
            | Cursor::LowerBoundMin { id, .. } => Some(id),
            Cursor::Limit { .. } | Cursor::Default => None,
        }
    }

    /// Returns the caller-requested page size before clamping.
    pub fn requested_limit(&self) -> Option<u32> {
        match self {
            Cursor::UpperBound { limit, .. }
            | Cursor::LowerBoundSince { limit, .. }
            | Cursor::LowerBoundMin { limit, .. } => *limit,
            Cursor::Limit { n } => Some(*n),
            Cursor::Default => None,
        }
    }

    /// Renders the cursor into query parameters.
    ///
    /// The requested limit is passed through `clamp`, so each call site can
    /// impose its own bounds. `Default` renders no parameters at all.
    pub fn build<F>(&self, clamp: F) -> Option<ParameterSet>
    where
        F: Fn(u32) -> u32,
    {
        let bounded = |name: &'static str, id: &str, limit: &Option<u32>| {
            ParameterSet::from(vec![
                Parameter::new(name, Some(id.to_string())),
                Parameter::new(LIMIT, limit.map(&clamp).map(|n| n.to_string())),
            ])
        };

        match self {
            Cursor::UpperBound { id, limit } => Some(bounded(MAX_ID, id, limit)),
            Cursor::LowerBoundSince { id, limit } => Some(bounded(SINCE_ID, id, limit)),
            Cursor::LowerBoundMin { id, limit } => Some(bounded(MIN_ID, id, limit)),
            Cursor::Limit { n } => Some(ParameterSet::from(vec![Parameter::new(
                LIMIT,
                Some(clamp(*n).to_string()),
            )])),
            Cursor::Default => None,
        }
    }

    /// Renders the cursor through a [`LimitClamp`].
    pub fn build_clamped(&self, clamp: &LimitClamp) -> Option<ParameterSet> {
        self.build(|n| clamp.apply(n))
    }

    /// Returns true if both cursors are of the same id-bearing kind.
    ///
    /// `Limit` and `Default` carry no id and are never comparable.
    pub fn is_comparable_with(&self, other: &Cursor) -> bool {
        matches!(
            (self, other),
            (Cursor::UpperBound { .. }, Cursor::UpperBound { .. })
                | (Cursor::LowerBoundSince { .. }, Cursor::LowerBoundSince { .. })
                | (Cursor::LowerBoundMin { .. }, Cursor::LowerBoundMin { .. })
        )
    }

    /// Orders two cursors of the same kind by the numeric value of their ids.
    ///
    /// Non-numeric ids compare as `0`. Comparing cursors of different kinds
    /// is a caller error and returns [`ProtocolError::IncomparableCursors`].
    pub fn compare(&self, other: &Cursor) -> ProtocolResult<Ordering> {
        match (self.id(), other.id()) {
            (Some(left), Some(right)) if self.is_comparable_with(other) => {
                Ok(numeric_id(left).cmp(&numeric_id(right)))
            }
            _ => Err(ProtocolError::IncomparableCursors {
                left: self.kind().to_string(),
                right: other.kind().to_string(),
            }),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::UpperBound { id, limit } => {
                write!(f, "upper_bound id={} limit={}", id, limit.unwrap_or(0))
            }
            Cursor::LowerBoundSince { id, limit } => {
                write!(f, "since id={} limit={}", id, limit.unwrap_or(0))
            }
            Cursor::LowerBoundMin { id, limit } => {
                write!(f, "min id={} limit={}", id, limit.unwrap_or(0))
            }
            Cursor::Limit { n } => write!(f, "limit={}", n),
            Cursor::Default => f.write_str("default"),
        }
    }
}

/// A single rendered query parameter.
///
/// A parameter with no value is omitted from the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name.
    pub name: &'static str,
    /// Parameter value, if present.
    pub value: Option<String>,
}

impl Parameter {
    /// Creates a new parameter.
    pub fn new(name: &'static str, value: Option<String>) -> Self {
        Self { name, value }
    }
}

/// An ordered set of rendered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// Returns the value of the named parameter, if present and set.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }

    /// Returns true if the named parameter is present and set.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over all parameters, including unset ones.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Returns the set parameters as name/value pairs.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        self.params
            .iter()
            .filter_map(|p| p.value.clone().map(|v| (p.name, v)))
            .collect()
    }

    /// Renders the set parameters as a `name=value&...` query string.
    pub fn to_query_string(&self) -> String {
        self.to_pairs()
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl From<Vec<Parameter>> for ParameterSet {
    fn from(params: Vec<Parameter>) -> Self {
        Self { params }
    }
}

/// Bounds a requested page size for one call site.
///
/// A requested limit inside `[min, max]` passes through unchanged; anything
/// outside the range is replaced by `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitClamp {
    /// Smallest accepted limit.
    pub min: u32,
    /// Largest accepted limit.
    pub max: u32,
    /// Limit used when the request falls outside the range.
    pub default: u32,
}

impl LimitClamp {
    /// Creates a clamp accepting `min..=max`, falling back to `default`.
    pub fn between(min: u32, max: u32, default: u32) -> Self {
        Self { min, max, default }
    }

    /// Applies the clamp to a requested limit.
    pub fn apply(&self, limit: u32) -> u32 {
        if (self.min..=self.max).contains(&limit) {
            limit
        } else {
            self.default
        }
    }
}

impl Default for LimitClamp {
    fn default() -> Self {
        Self::between(1, 80, 40)
    }
}
