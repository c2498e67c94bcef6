use lambda_http::{run, service_fn, tracing, Error};
mod dynamo;
mod http_handler;
mod store;
use dynamo::DynamoStore;
use http_handler::function_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_dynamodb::Client::new(&config);
    let table_name =
        std::env::var("PRODUCT_TABLE").map_err(|_| Error::from("PRODUCT_TABLE not set"))?;
    let store = DynamoStore::new(client, table_name);

    run(service_fn(|event| function_handler(&store, event))).await
}
