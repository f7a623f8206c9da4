use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::VoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_target_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    /// Table holding the `score` column for this kind.
    pub fn table(self) -> &'static str {
        match self {
            TargetKind::Post => "posts",
            TargetKind::Comment => "comments",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetKind::Post => "Post",
            TargetKind::Comment => "Comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteTarget {
    pub id: Uuid,
    pub kind: TargetKind,
}

impl VoteTarget {
    pub fn post(id: Uuid) -> Self {
        Self {
            id,
            kind: TargetKind::Post,
        }
    }

    pub fn comment(id: Uuid) -> Self {
        Self {
            id,
            kind: TargetKind::Comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum VoteDirection {
    Up = 1,
    Down = -1,
}

impl VoteDirection {
    /// Only an exact `1` counts as an upvote; every other value is a downvote.
    pub fn from_value(value: i32) -> Self {
        if value == 1 {
            VoteDirection::Up
        } else {
            VoteDirection::Down
        }
    }

    pub fn value(self) -> i16 {
        self as i16
    }
}

/// One caller's vote on one target. Absence of a record means "no vote".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VoteRecord {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub target_kind: TargetKind,
    pub direction: VoteDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn target(&self) -> VoteTarget {
        VoteTarget {
            id: self.target_id,
            kind: self.target_kind,
        }
    }
}

/// What a vote request does to the ledger, given the caller's current vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    Cast(VoteDirection),
    Flip { from: VoteDirection, to: VoteDirection },
    Repeat(VoteDirection),
}

impl VoteTransition {
    pub fn decide(current: Option<VoteDirection>, requested: VoteDirection) -> Self {
        match current {
            None => VoteTransition::Cast(requested),
            Some(existing) if existing == requested => VoteTransition::Repeat(requested),
            Some(existing) => VoteTransition::Flip {
                from: existing,
                to: requested,
            },
        }
    }

    /// Score delta to apply, or `None` when the request must be rejected.
    pub fn delta(self) -> Option<i32> {
        match self {
            VoteTransition::Cast(direction) => Some(i32::from(direction.value())),
            VoteTransition::Flip { to, .. } => Some(2 * i32::from(to.value())),
            VoteTransition::Repeat(_) => None,
        }
    }
}

/// Result of an applied transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub record: VoteRecord,
    pub previous: Option<VoteDirection>,
    pub score: i32,
}

/// Identity handed to the voting core by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    User(Uuid),
    Anonymous,
}

impl Caller {
    pub fn require(self) -> Result<Uuid, VoteError> {
        match self {
            Caller::User(user_id) => Ok(user_id),
            Caller::Anonymous => Err(VoteError::Unauthenticated),
        }
    }

    pub fn user_id(self) -> Option<Uuid> {
        match self {
            Caller::User(user_id) => Some(user_id),
            Caller::Anonymous => None,
        }
    }
}

// Vote request
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub value: i32, // 1 for upvote, anything else is a downvote
}

// Vote response
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub success: bool,
    pub score: i32,
    pub vote_status: Option<i16>,
}
