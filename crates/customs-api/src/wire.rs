//! Wire shapes of the `customs/procesamientopedimentos` resource.

use chrono::{DateTime, Utc};
use pedimentos_core::{PedimentoKey, ServiceKind, ServiceRecord, ServiceState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

pub(crate) const RECORDS_PATH: &str = "customs/procesamientopedimentos/";

/// Processing type sent when this engine creates a record itself.
pub(crate) const DEFAULT_PROCESSING_TYPE: i64 = 2;

/// A record as returned by the backend. `pedimento` and `organizacion` arrive
/// either as bare ids or as nested objects carrying an `id`.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordDto {
    pub id: Value,
    pub estado: i64,
    pub servicio: i64,
    #[serde(default)]
    pub pedimento: Value,
    #[serde(default)]
    pub organizacion: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// List endpoints may answer with a page, a bare array, or one object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RecordList {
    Page { results: Vec<RecordDto> },
    Many(Vec<RecordDto>),
    One(Box<RecordDto>),
}

impl RecordList {
    pub fn into_vec(self) -> Vec<RecordDto> {
        match self {
            RecordList::Page { results } => results,
            RecordList::Many(items) => items,
            RecordList::One(item) => vec![*item],
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateBody<'a> {
    pub estado: i64,
    pub tipo_procesamiento: i64,
    pub pedimento: &'a str,
    pub servicio: i64,
    pub organizacion: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct StateBody<'a> {
    pub estado: i64,
    pub pedimento: &'a str,
    pub organizacion: &'a str,
}

/// Extract an identifier from a bare string/number or an object's `id`.
pub(crate) fn ref_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("id").and_then(ref_id),
        _ => None,
    }
}

impl RecordDto {
    /// Whether the record belongs to the `(organization, pedimento, kind)`
    /// tuple.
    pub fn matches(&self, key: &PedimentoKey, kind: ServiceKind) -> bool {
        self.servicio == i64::from(kind.code())
            && ref_id(&self.pedimento).as_deref() == Some(key.pedimento_id.as_str())
            && ref_id(&self.organizacion).as_deref() == Some(key.organization_id.as_str())
    }

    /// Convert into a domain record. Missing references are filled from
    /// `key`, the tuple the record was requested for.
    pub fn into_record(self, key: &PedimentoKey) -> Result<ServiceRecord, ApiError> {
        let id = ref_id(&self.id)
            .ok_or_else(|| ApiError::InvalidRecord(format!("missing id in {:?}", self.id)))?;
        let kind = ServiceKind::from_code(self.servicio)
            .map_err(|e| ApiError::InvalidRecord(e.to_string()))?;
        let state = ServiceState::from_code(self.estado)
            .map_err(|e| ApiError::InvalidRecord(e.to_string()))?;
        let pedimento_id = ref_id(&self.pedimento).unwrap_or_else(|| key.pedimento_id.clone());
        let organization_id =
            ref_id(&self.organizacion).unwrap_or_else(|| key.organization_id.clone());
        let now = Utc::now();
        Ok(ServiceRecord {
            id,
            organization_id,
            pedimento_id,
            kind,
            state,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_and_bare_references_resolve() {
        assert_eq!(ref_id(&json!({"id": "p-1", "contribuyente": "x"})), Some("p-1".into()));
        assert_eq!(ref_id(&json!(42)), Some("42".into()));
        assert_eq!(ref_id(&json!("")), None);
        assert_eq!(ref_id(&Value::Null), None);
    }

    #[test]
    fn record_list_accepts_all_shapes() {
        let item = json!({"id": 1, "estado": 1, "servicio": 4, "pedimento": "p", "organizacion": "o"});
        let page: RecordList = serde_json::from_value(json!({"count": 1, "results": [item.clone()]})).unwrap();
        let many: RecordList = serde_json::from_value(json!([item.clone()])).unwrap();
        let one: RecordList = serde_json::from_value(item).unwrap();
        assert_eq!(page.into_vec().len(), 1);
        assert_eq!(many.into_vec().len(), 1);
        assert_eq!(one.into_vec().len(), 1);
    }

    #[test]
    fn into_record_maps_codes() {
        let dto: RecordDto = serde_json::from_value(json!({
            "id": 9,
            "estado": 2,
            "servicio": 6,
            "pedimento": {"id": "ped"},
            "organizacion": "org",
            "created_at": "2025-01-02T03:04:05Z"
        }))
        .unwrap();
        let key = PedimentoKey::new("org", "ped");
        assert!(dto.matches(&key, ServiceKind::Acuse));

        let record = dto.into_record(&key).unwrap();
        assert_eq!(record.id, "9");
        assert_eq!(record.kind, ServiceKind::Acuse);
        assert_eq!(record.state, ServiceState::InProgress);
        assert_eq!(record.key(), PedimentoKey::new("org", "ped"));
        assert_eq!(record.created_at.to_rfc3339(), "2025-01-02T03:04:05+00:00");
    }

    #[test]
    fn unknown_state_code_is_rejected() {
        let dto: RecordDto = serde_json::from_value(json!({
            "id": 1, "estado": 9, "servicio": 4, "pedimento": "p", "organizacion": "o"
        }))
        .unwrap();
        assert!(matches!(
            dto.into_record(&PedimentoKey::new("o", "p")),
            Err(ApiError::InvalidRecord(_))
        ));
    }

    #[test]
    fn record_of_another_organization_does_not_match() {
        let dto: RecordDto = serde_json::from_value(json!({
            "id": 3, "estado": 1, "servicio": 4,
            "pedimento": {"id": "ped-1"}, "organizacion": "org-other"
        }))
        .unwrap();
        assert!(!dto.matches(&PedimentoKey::new("org-1", "ped-1"), ServiceKind::Partidas));
        assert!(dto.matches(&PedimentoKey::new("org-other", "ped-1"), ServiceKind::Partidas));
    }

    #[test]
    fn missing_references_are_taken_from_lookup_key() {
        let dto: RecordDto = serde_json::from_value(json!({"id": 3, "estado": 3, "servicio": 4}))
            .unwrap();
        let key = PedimentoKey::new("org-1", "ped-1");
        assert!(!dto.matches(&key, ServiceKind::Partidas));

        let record = dto.into_record(&key).unwrap();
        assert_eq!(record.organization_id, "org-1");
        assert_eq!(record.pedimento_id, "ped-1");
    }
}
