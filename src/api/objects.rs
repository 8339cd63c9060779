use crate::{
    client::Client,
    error::{Error, Result},
    models::TemplateRecord,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const TYPE_SR: &str = "SR";
pub const TYPE_TEMPLATE: &str = "VM-template";
pub const TYPE_NETWORK: &str = "network";

/// Lookups through `xo.getAllObjects`.
#[derive(Clone)]
pub struct ObjectsApi {
    client: Client,
}

impl ObjectsApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// All objects matching `filter`, keyed by id.
    pub async fn list(&self, filter: Value) -> Result<BTreeMap<String, Value>> {
        let objects: Map<String, Value> = self
            .client
            .call_as("xo.getAllObjects", json!({ "filter": filter }))
            .await?;
        Ok(objects.into_iter().collect())
    }

    /// Id of the object of `object_type` whose `name_label` is `name`.
    pub async fn find_id(&self, object_type: &'static str, name: &str) -> Result<String> {
        let objects = self
            .list(json!({ "type": object_type, "name_label": name }))
            .await?;

        let mut matches = objects
            .into_iter()
            .filter(|(_, object)| object.get("name_label").and_then(Value::as_str) == Some(name))
            .map(|(id, _)| id);

        let id = matches.next().ok_or_else(|| Error::ResourceNotFound {
            kind: kind_label(object_type),
            name: name.to_string(),
        })?;

        let extra = matches.count();
        if extra > 0 {
            debug!("{} more {} objects named '{}', using {}", extra, object_type, name, id);
        }
        Ok(id)
    }

    pub async fn storage_repository_id(&self, name: &str) -> Result<String> {
        self.find_id(TYPE_SR, name).await
    }

    pub async fn template_id(&self, name: &str) -> Result<String> {
        self.find_id(TYPE_TEMPLATE, name).await
    }

    pub async fn network_id(&self, name: &str) -> Result<String> {
        self.find_id(TYPE_NETWORK, name).await
    }

    pub async fn templates(&self) -> Result<BTreeMap<String, TemplateRecord>> {
        let objects = self.list(json!({ "type": TYPE_TEMPLATE })).await?;
        objects
            .into_iter()
            .map(|(id, object)| {
                let mut record: TemplateRecord = serde_json::from_value(object).map_err(|e| {
                    Error::UnexpectedResponse {
                        method: "xo.getAllObjects".to_string(),
                        detail: format!("template {}: {}", id, e),
                    }
                })?;
                if record.id.is_empty() {
                    record.id = id.clone();
                }
                Ok((id, record))
            })
            .collect()
    }
}

fn kind_label(object_type: &'static str) -> &'static str {
    match object_type {
        TYPE_SR => "Storage repository",
        TYPE_TEMPLATE => "Template",
        TYPE_NETWORK => "Network",
        other => other,
    }
}
