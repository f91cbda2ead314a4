// Read-only portal operations: profile, summary, vehicle health report, tow guide

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{MoparError, Result};
use crate::models::{Summary, UserSummary, Vehicle, VehicleSummary, vehicles};
use crate::session::{Session, authenticated_document, document};

// Report values the portal uses for "nothing to show"
const EMPTY_VALUES: [&str; 3] = ["Null", "N/A", "NULL"];

impl Session {
    /// The complete account profile, fetched fresh.
    pub async fn profile(&self) -> Result<Value> {
        self.call_authenticated(fetch_profile).await
    }

    pub async fn summary(&self) -> Result<Summary> {
        let profile = self.profile().await?;
        summarize(&profile)
    }

    /// The raw vehicle health report document for `profile.vehicles[index]`.
    pub async fn vehicle_health_report(&self, index: usize) -> Result<Value> {
        self.call_authenticated(move |s| fetch_vehicle_health_report(s, index))
            .await
    }

    /// The vehicle health report flattened to `itemKey -> value`.
    pub async fn report(&self, index: usize) -> Result<BTreeMap<String, String>> {
        let vhr = self.vehicle_health_report(index).await?;
        let card = vhr
            .get("reportCard")
            .ok_or_else(|| MoparError::Protocol("no vhr found".into()))?;
        Ok(traverse_report(card))
    }

    pub async fn tow_guide(&self, index: usize) -> Result<Value> {
        self.call_authenticated(move |s| s.with_csrf_token(move |s| fetch_tow_guide(s, index)))
            .await
    }
}

/// Single profile request, without re-authentication.
pub(crate) async fn fetch_profile(session: &Session) -> Result<Value> {
    tracing::debug!("Fetching profile");
    let body = session
        .get(&session.config().profile_url)
        .send()
        .await?
        .text()
        .await?;
    authenticated_document(&body)
}

/// Fetches the profile and resolves `index` against it.
pub(crate) async fn resolve_vehicle(session: &Session, index: usize) -> Result<Vehicle> {
    let profile = fetch_profile(session).await?;
    Vehicle::from_profile(&profile, index)
}

async fn fetch_vehicle_health_report(session: &Session, index: usize) -> Result<Value> {
    let vehicle = resolve_vehicle(session, index).await?;
    let config = session.config();
    let kind = config.vhr_identifier;

    let body = session
        .get(&config.vhr_url)
        .query(&[(kind.param(), vehicle.identifier(kind))])
        .send()
        .await?
        .text()
        .await?;
    document(&body)
}

async fn fetch_tow_guide(session: &Session, index: usize) -> Result<Value> {
    let vehicle = resolve_vehicle(session, index).await?;
    let config = session.config();
    let kind = config.tow_identifier;

    let body = session
        .post(&config.tow_url)
        .form(&[(kind.param(), vehicle.identifier(kind))])
        .send()
        .await?
        .text()
        .await?;
    document(&body)
}

/// Flattens a report tree into `itemKey -> value`.
///
/// Items marked `NonDisplay`, category descriptions and empty values are
/// dropped together with their children. `"0.0"` reads as `"Ok"`. Nested
/// items land in the same map as their parents, later keys overwriting
/// earlier ones.
pub fn traverse_report(node: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(node, &mut out);
    out
}

fn flatten_into(node: &Value, out: &mut BTreeMap<String, String>) {
    let Some(items) = node.get("items").and_then(Value::as_array) else {
        return;
    };

    for item in items {
        if is_hidden(item) {
            continue;
        }
        let Some(key) = item.get("itemKey").and_then(Value::as_str) else {
            continue;
        };
        out.insert(key.to_string(), display_value(&item["value"]));
        flatten_into(item, out);
    }
}

fn is_hidden(item: &Value) -> bool {
    let severity = item.get("severity").and_then(Value::as_str);
    let key = item.get("itemKey").and_then(Value::as_str);
    let empty = match item.get("value") {
        None | Some(Value::Null) => true,
        Some(Value::String(value)) => EMPTY_VALUES.contains(&value.as_str()),
        Some(_) => false,
    };
    severity == Some("NonDisplay") || key == Some("categoryDesc") || empty
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) if s == "0.0" => "Ok".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_field(value: &Value, key: &str) -> Result<String> {
    match value.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(MoparError::Protocol(format!("profile field {key} missing"))),
    }
}

/// Best guess at the bare model name: the model string minus year and make,
/// first word only.
fn clean_model(model: &str, year: &str, make: &str) -> String {
    model
        .replace(year, "")
        .replace(make, "")
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn summarize(profile: &Value) -> Result<Summary> {
    let user = profile
        .get("userProfile")
        .ok_or_else(|| MoparError::Protocol("profile has no userProfile".into()))?;

    let vehicles = vehicles(profile)?
        .iter()
        .map(|vehicle| {
            let year = text_field(vehicle, "year")?;
            let make = text_field(vehicle, "make")?;
            let model = clean_model(&text_field(vehicle, "model")?, &year, &make);
            Ok(VehicleSummary {
                vin: text_field(vehicle, "vin")?,
                year,
                make,
                model,
                odometer: vehicle.get("odometerMileage").cloned().unwrap_or(Value::Null),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Summary {
        user: UserSummary {
            email: text_field(user, "eMail")?,
            name: format!("{} {}", text_field(user, "firstName")?, text_field(user, "lastName")?),
        },
        vehicles,
    })
}
