use crate::store::{scan_all, Item, ProductStore};
use lambda_http::{tracing, Body, Error, Request, RequestExt, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Upper bound on scan pages per get-all request. A table needing more pages
/// than this fails the request instead of holding the invocation open.
const MAX_SCAN_PAGES: usize = 32;

/// Whole-request deadline, kept under the API Gateway 29s integration cap.
const REQUEST_DEADLINE: Duration = Duration::from_secs(25);

#[derive(Deserialize)]
struct UpdateRequest {
    #[serde(rename = "productId")]
    product_id: String,
    #[serde(rename = "updateKey")]
    update_key: String,
    #[serde(rename = "updateValue")]
    update_value: Value,
}

#[derive(Deserialize)]
struct DeleteRequest {
    #[serde(rename = "productId")]
    product_id: String,
}

#[derive(Serialize)]
struct MutationSummary {
    operation: &'static str,
    message: &'static str,
    item: Value,
}

#[derive(Serialize)]
struct ProductList {
    products: Vec<Item>,
}

pub(crate) async fn function_handler<S: ProductStore>(
    store: &S,
    event: Request,
) -> Result<Response<Body>, Error> {
    match tokio::time::timeout(REQUEST_DEADLINE, route(store, event)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("request deadline exceeded");
            error_response(500, "request timed out")
        }
    }
}

async fn route<S: ProductStore>(store: &S, event: Request) -> Result<Response<Body>, Error> {
    let path = event.uri().path();
    let method = event.method().as_str();
    tracing::info!("inbound request: {method} {path}");

    match (method, path) {
        ("GET", "/health") => empty_response(200),
        ("GET", "/product") => {
            let params = event.query_string_parameters();
            let product_id = match params.first("productId") {
                Some(id) if !id.is_empty() => id.to_owned(),
                _ => return error_response(400, "missing productId query parameter"),
            };
            get_product(store, &product_id).await
        }
        ("GET", "/products") => get_products(store).await,
        ("POST", "/product") => {
            let item = match serde_json::from_slice::<Value>(event.body().as_ref()) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return error_response(400, "request body must be a JSON object"),
                Err(e) => return error_response(400, &format!("invalid JSON: {e}")),
            };
            save_product(store, item).await
        }
        ("PATCH", "/product") => {
            let req: UpdateRequest = match serde_json::from_slice(event.body().as_ref()) {
                Ok(req) => req,
                Err(e) => return error_response(400, &format!("invalid JSON: {e}")),
            };
            // The field name ends up inside an update expression; accept
            // identifiers only, never expression syntax.
            if !is_field_name(&req.update_key) {
                return error_response(400, "updateKey must be a plain field name");
            }
            update_product(store, req).await
        }
        ("DELETE", "/product") => {
            let req: DeleteRequest = match serde_json::from_slice(event.body().as_ref()) {
                Ok(req) => req,
                Err(e) => return error_response(400, &format!("invalid JSON: {e}")),
            };
            delete_product(store, &req.product_id).await
        }
        _ => error_response(404, &format!("no route for {method} {path}")),
    }
}

async fn get_product<S: ProductStore>(
    store: &S,
    product_id: &str,
) -> Result<Response<Body>, Error> {
    match store.get(product_id).await {
        // A miss is not an error; the body is null, as the store reports it.
        Ok(item) => json_response(200, &item),
        Err(err) => {
            tracing::error!("get product: {err}");
            error_response(500, &format!("internal error: {err}"))
        }
    }
}

async fn get_products<S: ProductStore>(store: &S) -> Result<Response<Body>, Error> {
    match scan_all(store, MAX_SCAN_PAGES).await {
        Ok(products) => json_response(200, &ProductList { products }),
        Err(err) => {
            tracing::error!("get products: {err}");
            error_response(500, &format!("internal error: {err}"))
        }
    }
}

async fn save_product<S: ProductStore>(store: &S, item: Item) -> Result<Response<Body>, Error> {
    match store.put(item.clone()).await {
        Ok(()) => json_response(
            200,
            &MutationSummary {
                operation: "SAVE",
                message: "SUCCESS",
                item: Value::Object(item),
            },
        ),
        Err(err) => {
            tracing::error!("save product: {err}");
            error_response(500, &format!("internal error: {err}"))
        }
    }
}

async fn update_product<S: ProductStore>(
    store: &S,
    req: UpdateRequest,
) -> Result<Response<Body>, Error> {
    match store
        .update(&req.product_id, &req.update_key, req.update_value)
        .await
    {
        Ok(updated) => json_response(
            200,
            &MutationSummary {
                operation: "UPDATE",
                message: "SUCCESS",
                item: updated.map(Value::Object).unwrap_or(Value::Null),
            },
        ),
        Err(err) => {
            tracing::error!("update product: {err}");
            error_response(500, &format!("internal error: {err}"))
        }
    }
}

async fn delete_product<S: ProductStore>(
    store: &S,
    product_id: &str,
) -> Result<Response<Body>, Error> {
    match store.delete(product_id).await {
        Ok(removed) => json_response(
            200,
            &MutationSummary {
                operation: "DELETE",
                message: "SUCCESS",
                item: removed.map(Value::Object).unwrap_or(Value::Null),
            },
        ),
        Err(err) => {
            tracing::error!("delete product: {err}");
            error_response(500, &format!("internal error: {err}"))
        }
    }
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn json_response<T: Serialize>(status: u16, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::Text(serde_json::to_string(body)?))?)
}

fn empty_response(status: u16) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::Empty)?)
}

fn error_response(status: u16, message: &str) -> Result<Response<Body>, Error> {
    json_response(status, &json!({ "error": message }))
}
