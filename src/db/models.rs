use serde::{Deserialize, Deserializer, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
    Upcoming,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Upcoming => "upcoming",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "upcoming" => Ok(ProjectStatus::Upcoming),
            other => Err(format!("unknown project status '{}'", other)),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Verified,
    Cancelled,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Verified => "verified",
            DonationStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(DonationStatus::Pending),
            "verified" => Ok(DonationStatus::Verified),
            "cancelled" => Ok(DonationStatus::Cancelled),
            other => Err(format!("unknown donation status '{}'", other)),
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub target: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub raised: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Share of the target already raised, clamped to 0..=100.
    pub fn progress_percent(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        (self.raised / self.target * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Donation {
    pub id: String,
    pub name: String,
    pub email: String,
    pub amount: f64,
    pub message: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub transfer_confirmation: String,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    // Filled from the projects table on admin listings, never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_title: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "flag_from_bool_or_int")]
    pub responded: bool,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub total_projects: usize,
    pub active_projects: usize,
    pub total_donations: usize,
    pub total_raised: f64,
    pub total_messages: usize,
}

/// Fields accepted when recording a pledge. Status is always `pending` on insert.
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub name: String,
    pub email: String,
    pub amount: f64,
    pub message: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub transfer_confirmation: String,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewProject {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub target: f64,
    #[serde(default)]
    pub raised: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProjectStatus,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub target: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    /// Absent leaves the end date alone; `null` clears it.
    #[serde(default, deserialize_with = "present_or_null")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub status: Option<ProjectStatus>,
}

// Wraps any present value, `null` included, so absence stays distinguishable.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

// SQLite hands back INTEGER 0/1 where Postgres hands back a boolean.
fn flag_from_bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        None => false,
    })
}
