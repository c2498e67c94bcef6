use crate::store::{Item, ProductStore, ScanCursor, StoreError};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use std::collections::HashMap;

/// DynamoDB-backed [`ProductStore`]. Holds the shared SDK client and the
/// table name resolved once at startup.
#[derive(Clone)]
pub(crate) struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    pub(crate) fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn key(product_id: &str) -> AttributeValue {
        AttributeValue::S(product_id.to_string())
    }
}

fn request_error<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Request(Box::new(err))
}

#[async_trait]
impl ProductStore for DynamoStore {
    async fn get(&self, product_id: &str) -> Result<Option<Item>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("productId", Self::key(product_id))
            .send()
            .await
            .map_err(request_error)?;

        Ok(output.item.as_ref().map(attrs_to_item))
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_to_attrs(&item)))
            .send()
            .await
            .map_err(request_error)?;

        Ok(())
    }

    async fn update(
        &self,
        product_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Option<Item>, StoreError> {
        // The field name and value travel as expression parameters, never
        // spliced into the expression string itself.
        let output = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("productId", Self::key(product_id))
            .update_expression("SET #field = :value")
            .expression_attribute_names("#field", field)
            .expression_attribute_values(":value", json_to_attr(&value))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await
            .map_err(request_error)?;

        Ok(output.attributes.as_ref().map(attrs_to_item))
    }

    async fn delete(&self, product_id: &str) -> Result<Option<Item>, StoreError> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("productId", Self::key(product_id))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(request_error)?;

        Ok(output.attributes.as_ref().map(attrs_to_item))
    }

    async fn scan_page(
        &self,
        cursor: Option<ScanCursor>,
    ) -> Result<(Vec<Item>, Option<ScanCursor>), StoreError> {
        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .set_exclusive_start_key(cursor.map(|c| c.0))
            .send()
            .await
            .map_err(request_error)?;

        let items = output
            .items
            .unwrap_or_default()
            .iter()
            .map(attrs_to_item)
            .collect();
        let next = output.last_evaluated_key.map(ScanCursor);

        Ok((items, next))
    }
}

fn item_to_attrs(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(name, value)| (name.clone(), json_to_attr(value)))
        .collect()
}

fn attrs_to_item(attrs: &HashMap<String, AttributeValue>) -> Item {
    attrs
        .iter()
        .map(|(name, attr)| (name.clone(), attr_to_json(attr)))
        .collect()
}

fn json_to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(name, value)| (name.clone(), json_to_attr(value)))
                .collect(),
        ),
    }
}

/// Renders a stored attribute as JSON. Set types come back as arrays and
/// binary values as base64 strings, since JSON has no counterpart for them.
fn attr_to_json(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(list) => Value::Array(list.iter().map(attr_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(name, attr)| (name.clone(), attr_to_json(attr)))
                .collect(),
        ),
        AttributeValue::Ss(set) => {
            Value::Array(set.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| parse_number(n)).collect()),
        AttributeValue::B(blob) => {
            Value::String(general_purpose::STANDARD.encode(blob.as_ref()))
        }
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|blob| Value::String(general_purpose::STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    n.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(n.to_string()))
}
