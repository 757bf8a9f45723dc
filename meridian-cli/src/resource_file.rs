//! Loading desired resources from JSON resource files
//!
//! ```json
//! {
//!   "resources": [
//!     { "type": "vgw_conn", "name": "main", "attributes": { "conn_name": "conn1" } }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use meridian_core::resource::{Resource, ResourceId, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct ResourceFile {
    #[serde(default)]
    resources: Vec<ResourceBlock>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ResourceBlock {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

pub fn load(path: &Path) -> Result<Vec<Resource>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

pub fn parse(content: &str) -> Result<Vec<Resource>, String> {
    let file: ResourceFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

    let mut seen = HashSet::new();
    let mut resources = Vec::with_capacity(file.resources.len());
    for block in file.resources {
        let id = ResourceId::new(block.resource_type, block.name);
        if !seen.insert(id.clone()) {
            return Err(format!("Duplicate resource {}", id));
        }
        let mut attributes = HashMap::new();
        for (key, value) in block.attributes {
            let converted =
                json_to_value(&value).map_err(|e| format!("{}.{}: {}", id, key, e))?;
            attributes.insert(key, converted);
        }
        resources.push(Resource { id, attributes });
    }
    Ok(resources)
}

fn json_to_value(json: &serde_json::Value) -> Result<Value, String> {
    match json {
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| format!("unsupported number {}", n)),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
            .collect::<Result<HashMap<_, _>, _>>()
            .map(Value::Map),
        serde_json::Value::Null => Err("null is not a valid value".to_string()),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Render a resource as a block that can be pasted into a resource file
pub fn to_block_json(id: &ResourceId, attributes: &HashMap<String, Value>) -> String {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();
    let attributes = keys
        .into_iter()
        .map(|k| (k.clone(), value_to_json(&attributes[k])))
        .collect();
    let block = ResourceBlock {
        resource_type: id.resource_type.clone(),
        name: id.name.clone(),
        attributes,
    };
    serde_json::to_string_pretty(&block).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_resources_in_order() {
        let resources = parse(
            r#"{
                "resources": [
                    {
                        "type": "vgw_conn",
                        "name": "main",
                        "attributes": {
                            "conn_name": "conn1",
                            "enable_event_triggered_ha": true,
                            "prepend_as_path": ["65001", "65001"]
                        }
                    },
                    {
                        "type": "segmentation_network_domain_connection_policy",
                        "name": "prod_shared",
                        "attributes": { "domain_name_1": "prod", "domain_name_2": "shared" }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id, ResourceId::new("vgw_conn", "main"));
        assert!(resources[0].get_bool("enable_event_triggered_ha"));
        assert_eq!(
            resources[0].get_string_list("prepend_as_path"),
            vec!["65001", "65001"]
        );
        assert_eq!(resources[1].get_str("domain_name_2"), "shared");
    }

    #[test]
    fn rejects_duplicates() {
        let err = parse(
            r#"{"resources": [
                {"type": "vgw_conn", "name": "a"},
                {"type": "vgw_conn", "name": "a"}
            ]}"#,
        )
        .unwrap_err();
        assert!(err.contains("Duplicate resource vgw_conn.a"));
    }

    #[test]
    fn rejects_null_and_fractional_values() {
        let err = parse(
            r#"{"resources": [{"type": "vgw_conn", "name": "a", "attributes": {"conn_name": null}}]}"#,
        )
        .unwrap_err();
        assert!(err.contains("vgw_conn.a.conn_name"));

        assert!(
            parse(r#"{"resources": [{"type": "vgw_conn", "name": "a", "attributes": {"x": 1.5}}]}"#)
                .is_err()
        );
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"resources": [{{"type": "vgw_conn", "name": "a", "attributes": {{"vpc_id": "vpc-1"}}}}]}}"#
        )
        .unwrap();

        let resources = load(file.path()).unwrap();
        assert_eq!(resources[0].get_str("vpc_id"), "vpc-1");

        let missing = file.path().with_extension("missing");
        assert!(load(&missing).unwrap_err().starts_with("Failed to read"));
    }

    #[test]
    fn block_json_loads_back() {
        let attributes = HashMap::from([
            ("domain_name_1".to_string(), Value::String("prod".to_string())),
            ("domain_name_2".to_string(), Value::String("shared".to_string())),
        ]);
        let id = ResourceId::new("segmentation_network_domain_connection_policy", "p");
        let block = to_block_json(&id, &attributes);

        let resources = parse(&format!(r#"{{"resources": [{}]}}"#, block)).unwrap();
        assert_eq!(resources[0].id, id);
        assert_eq!(resources[0].attributes, attributes);
    }
}
