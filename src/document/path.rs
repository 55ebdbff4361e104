/*!
 * Stable addressing of segments and tokens inside a text.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index path to a segment, or to a token inside a segment.
///
/// Ordering follows document order, with a segment sorting before its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath {
    pub page: usize,
    pub segment: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<usize>,
}

impl NodePath {
    /// Path of a segment
    pub fn segment(page: usize, segment: usize) -> Self {
        Self { page, segment, token: None }
    }

    /// Path of a token
    pub fn token(page: usize, segment: usize, token: usize) -> Self {
        Self {
            page,
            segment,
            token: Some(token),
        }
    }

    /// The segment this path belongs to
    pub fn segment_path(&self) -> Self {
        Self::segment(self.page, self.segment)
    }

    pub fn is_token(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}/s{}", self.page, self.segment)?;
        if let Some(token) = self.token {
            write!(f, "/t{}", token)?;
        }
        Ok(())
    }
}
