/// Database models for Mildew
///
/// This module contains all database models and their CRUD operations.
///
/// # Models
///
/// - `user`: User accounts and authentication
/// - `record`: Stored detection results, one row per analysed image
///
/// # Example
///
/// ```no_run
/// use mildew_shared::models::user::{User, CreateUser};
/// use mildew_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let new_user = CreateUser {
///     username: "farmer".to_string(),
///     password_hash: "$2b$12$...".to_string(),
///     nickname: "Farmer".to_string(),
/// };
///
/// let user = User::create(&pool, new_user).await?;
/// # Ok(())
/// # }
/// ```

pub mod record;
pub mod user;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Disease a detection request was made for
///
/// Each kind is served by its own model and stored in the `type` column of
/// detection records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    /// Downy mildew, graded by lesion class
    Downy,

    /// Powdery mildew
    Powdery,

    /// Frogeye leaf spot, analysed per leaf
    Frogeye,
}

impl DetectionKind {
    /// All kinds, in a stable order
    pub const ALL: [DetectionKind; 3] = [
        DetectionKind::Downy,
        DetectionKind::Powdery,
        DetectionKind::Frogeye,
    ];

    /// Converts kind to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionKind::Downy => "downy",
            DetectionKind::Powdery => "powdery",
            DetectionKind::Frogeye => "frogeye",
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "downy" => Ok(DetectionKind::Downy),
            "powdery" => Ok(DetectionKind::Powdery),
            "frogeye" => Ok(DetectionKind::Frogeye),
            other => Err(format!("Unknown detection kind: {}", other)),
        }
    }
}
