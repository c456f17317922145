use std::collections::BTreeMap;

use serde::Deserialize;

/// The suite that ships with the binary.
pub const BUILTIN_SUITE: &str = include_str!("../suites/telecarezone.toml");
pub const BUILTIN_SUITE_NAME: &str = "suites/telecarezone.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct Suite {
    pub setup: Setup,
    #[serde(default)]
    pub global: Global,
    pub tests: Vec<Test>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Setup {
    pub name: Option<String>,
    pub base_url: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Global {
    pub headers: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Test {
    pub name: String,
    pub method: String,
    pub endpoint: String,
    pub assert_status: i32,
    #[serde(default)]
    pub requires: Vec<String>,
    pub headers: Option<toml::Value>,
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub without_token: bool,
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
    pub capture_token: Option<String>,
    #[serde(default)]
    pub assert_fields: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_suite_deserializes() {
        let suite: Suite = toml::from_str(BUILTIN_SUITE).unwrap();

        assert!(suite.setup.base_url.starts_with("https://"));
        assert_eq!(suite.setup.timeout_secs, Some(30));
        assert_eq!(suite.tests[0].name, "Root Endpoint");
        assert_eq!(suite.tests[0].endpoint, "");
    }

    #[test]
    fn optional_fields_default() {
        let suite: Suite = toml::from_str(
            r#"
            [setup]
            base_url = "http://localhost:8000/api"

            [[tests]]
            name = "Root"
            method = "GET"
            endpoint = ""
            assert_status = 200
            "#,
        )
        .unwrap();

        let test = &suite.tests[0];
        assert!(suite.global.headers.is_none());
        assert!(test.requires.is_empty());
        assert!(test.headers.is_none());
        assert!(test.body.is_none());
        assert!(!test.without_token);
        assert!(test.capture.is_empty());
        assert!(test.assert_fields.is_empty());
    }

    #[test]
    fn body_sub_table_keeps_types() {
        let suite: Suite = toml::from_str(
            r#"
            [setup]
            base_url = "http://localhost:8000/api"

            [[tests]]
            name = "Create Appointment"
            method = "POST"
            endpoint = "appointments"
            assert_status = 200
            requires = ["professional_id"]
            capture = { appointment_id = "id" }
            [tests.body]
            professional_id = "{professional_id}"
            patient_age = 35
            consulting_fees = 1500.0
            "#,
        )
        .unwrap();

        let test = &suite.tests[0];
        let body = test.body.as_ref().unwrap();
        assert_eq!(body["patient_age"], serde_json::json!(35));
        assert_eq!(body["consulting_fees"], serde_json::json!(1500.0));
        assert_eq!(test.capture["appointment_id"], "id");
    }
}
