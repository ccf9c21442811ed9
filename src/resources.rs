//! Typed entity records and their CRUD clients.
//!
//! Each client is a thin wrapper issuing one gateway call per operation:
//! no retries, no batching, no local caching. Hosts refetch after a
//! mutation to stay consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;
use crate::gateway::ApiGateway;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub department_id: i32,
    pub name: String,
    pub budget: f64,
    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discriminator {
    Instructor,
    Student,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub discriminator: Discriminator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_date: Option<DateTime<Utc>>,
}

/// Creation payload: the server assigns `personId`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
    pub discriminator: Discriminator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_date: Option<DateTime<Utc>>,
}

pub struct Departments<'a> {
    gateway: &'a ApiGateway,
}

impl<'a> Departments<'a> {
    pub fn new(gateway: &'a ApiGateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> ApiResult<Vec<Department>> {
        self.gateway.get("/Department").await
    }

    pub async fn get(&self, id: i32) -> ApiResult<Department> {
        self.gateway.get(&format!("/Department/{}", id)).await
    }

    /// Departments carry a caller-chosen id, so create sends the full record.
    pub async fn create(&self, department: &Department) -> ApiResult<Value> {
        self.gateway.post("/Department", department).await
    }

    /// Whole-record update; the id travels in the body.
    pub async fn update(&self, department: &Department) -> ApiResult<Value> {
        self.gateway.put("/Department", department).await
    }

    pub async fn delete(&self, id: i32) -> ApiResult<()> {
        self.gateway.delete(&format!("/Department/{}", id)).await
    }
}

pub struct Persons<'a> {
    gateway: &'a ApiGateway,
}

impl<'a> Persons<'a> {
    pub fn new(gateway: &'a ApiGateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> ApiResult<Vec<Person>> {
        self.gateway.get("/Person").await
    }

    pub async fn get(&self, id: i32) -> ApiResult<Person> {
        self.gateway.get(&format!("/Person/{}", id)).await
    }

    pub async fn create(&self, person: &NewPerson) -> ApiResult<Value> {
        self.gateway.post("/Person", person).await
    }

    pub async fn update(&self, person: &Person) -> ApiResult<Value> {
        self.gateway.put("/Person", person).await
    }

    pub async fn delete(&self, id: i32) -> ApiResult<()> {
        self.gateway.delete(&format!("/Person/{}", id)).await
    }
}

/// Untyped client for the entity kinds the core treats as opaque payloads
/// (Patient, Physician, User). Same five operations, `Value` in and out.
pub struct ResourceClient<'a> {
    gateway: &'a ApiGateway,
    kind: String,
}

impl<'a> ResourceClient<'a> {
    /// `kind` is the server-side route segment, e.g. "Patient".
    pub fn new(gateway: &'a ApiGateway, kind: impl Into<String>) -> Self {
        Self { gateway, kind: kind.into() }
    }

    pub async fn list(&self) -> ApiResult<Vec<Value>> {
        self.gateway.get(&format!("/{}", self.kind)).await
    }

    pub async fn get(&self, id: &str) -> ApiResult<Value> {
        self.gateway.get(&format!("/{}/{}", self.kind, id)).await
    }

    pub async fn create(&self, record: &Value) -> ApiResult<Value> {
        self.gateway.post(&format!("/{}", self.kind), record).await
    }

    pub async fn update(&self, record: &Value) -> ApiResult<Value> {
        self.gateway.put(&format!("/{}", self.kind), record).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        self.gateway.delete(&format!("/{}/{}", self.kind, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn department_wire_shape() {
        let dept = Department {
            department_id: 3,
            name: "Cardiología".into(),
            budget: 125000.0,
            start_date: "2024-01-15T00:00:00Z".parse().unwrap(),
        };
        let v = serde_json::to_value(&dept).unwrap();
        assert_eq!(v["departmentId"], 3);
        assert_eq!(v["name"], "Cardiología");
        assert_eq!(v["budget"], 125000.0);
        assert!(v["startDate"].is_string());
    }

    #[test]
    fn person_roundtrip_and_optional_dates() {
        let raw = json!({
            "personId": 9,
            "firstName": "Marta",
            "lastName": "Solís",
            "discriminator": "Student",
            "enrollmentDate": "2025-02-01T00:00:00Z"
        });
        let person: Person = serde_json::from_value(raw).unwrap();
        assert_eq!(person.discriminator, Discriminator::Student);
        assert!(person.hire_date.is_none());
        assert!(person.enrollment_date.is_some());

        // hireDate must not be serialized when absent
        let v = serde_json::to_value(&person).unwrap();
        assert!(v.get("hireDate").is_none());
    }

    #[test]
    fn new_person_omits_id() {
        let p = NewPerson {
            first_name: "Luis".into(),
            last_name: "Mora".into(),
            discriminator: Discriminator::Instructor,
            hire_date: Some("2023-06-01T00:00:00Z".parse().unwrap()),
            enrollment_date: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("personId").is_none());
        assert_eq!(v["discriminator"], "Instructor");
    }
}
