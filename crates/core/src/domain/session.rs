use std::fmt;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Server-generated id used when the client does not supply one.
    pub fn generate() -> Self {
        Self(format!("session_{}", Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    HomeAudio,
    RestaurantCafe,
    BusinessOffice,
    CommercialRetail,
    TenderGovernment,
    FitnessGym,
    Education,
    Worship,
    Hospitality,
    #[default]
    Other,
}

impl UsageType {
    /// Wire name, as accepted in consultation contexts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HomeAudio => "home_audio",
            Self::RestaurantCafe => "restaurant_cafe",
            Self::BusinessOffice => "business_office",
            Self::CommercialRetail => "commercial_retail",
            Self::TenderGovernment => "tender_government",
            Self::FitnessGym => "fitness_gym",
            Self::Education => "education",
            Self::Worship => "worship",
            Self::Hospitality => "hospitality",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HomeAudio => "Home Audio",
            Self::RestaurantCafe => "Restaurant / Cafe",
            Self::BusinessOffice => "Business / Office",
            Self::CommercialRetail => "Commercial / Retail",
            Self::TenderGovernment => "Tender / Government",
            Self::FitnessGym => "Fitness / Gym",
            Self::Education => "Education",
            Self::Worship => "Worship",
            Self::Hospitality => "Hospitality",
            Self::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceDetails {
    #[serde(default)]
    pub primary_use: Option<String>,
    #[serde(default)]
    pub ambient_noise: Option<String>,
    #[serde(default)]
    pub existing_audio: Option<String>,
    #[serde(default)]
    pub power_available: Option<String>,
    #[serde(default)]
    pub installation_complexity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Wizard output handed to the consultation. The engine only renders it
/// into prompts; it never branches on its contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationContext {
    #[serde(default)]
    pub usage_type: UsageType,
    #[serde(default)]
    pub space_size: Option<String>,
    #[serde(default)]
    pub space_details: Option<SpaceDetails>,
    #[serde(default)]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub specific_requirements: Option<String>,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

impl ConsultationContext {
    pub fn space_size_label(&self) -> &str {
        self.space_size.as_deref().filter(|size| !size.trim().is_empty()).unwrap_or("Not specified")
    }

    pub fn budget_label(&self) -> String {
        self.budget.map_or_else(|| "Flexible".to_owned(), |budget| format!("${}", budget.normalize()))
    }
}
