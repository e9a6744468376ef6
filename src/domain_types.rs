//! Domain types for the drip campaign scheduler
//!
//! This module defines strongly-typed domain values to prevent primitive
//! obsession and improve type safety throughout the codebase.

use nutype::nutype;
use uuid::Uuid;

/// Unique identifier for a campaign
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct CampaignId(Uuid);

impl CampaignId {
    /// Creates a new random campaign ID
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Parses a campaign ID from its string form
    ///
    /// # Errors
    ///
    /// Returns the underlying UUID parse error if the string is not a valid UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self::new)
    }
}

/// Unique identifier for a message row
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Parses a message ID from its string form
    ///
    /// # Errors
    ///
    /// Returns the underlying UUID parse error if the string is not a valid UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self::new)
    }
}

/// Identifier of the user that owns a campaign
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Creates a new random owner ID
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Parses an owner ID from its string form
    ///
    /// # Errors
    ///
    /// Returns the underlying UUID parse error if the string is not a valid UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self::new)
    }
}

/// Human-readable campaign name
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct CampaignName(String);

/// Size of the SQLite connection pool
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, TryFrom, Into, Default),
    default = 10,
)]
pub struct ConnectionPoolSize(u32);
