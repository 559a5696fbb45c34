//! DynamoDB table backend.
//!
//! Table schema (pay-per-request):
//! - `pk`: partition key, persistence id (String, HASH)
//! - `rk`: row key, encoded sequence number (String, RANGE)
//! - remaining attributes: entity properties
//!
//! Batches run as one `TransactWriteItems` call, so they are atomic and
//! limited to 100 operations. Conditional expressions provide insert
//! conflicts and replace/delete not-found detection.

mod item;

use std::ops::Bound;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, Delete, KeySchemaElement, KeyType, Put,
    ScalarAttributeType, TableStatus, TransactWriteItem,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use self::item::{from_item, key, to_item, PK, RK};
use super::{
    Result, RowRange, StorageError, TableBackend, TableBatch, TableEntity, TableOperation,
    MAX_BATCH_OPERATIONS,
};

/// Polls of `DescribeTable` while waiting for a new table to become active.
const TABLE_ACTIVE_POLLS: u32 = 60;
const TABLE_ACTIVE_INTERVAL: Duration = Duration::from_millis(500);

/// Error codes worth retrying.
const TRANSIENT_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
    "TransactionConflictException",
    "TransactionInProgressException",
];

fn map_sdk_error<E, R>(context: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{}: {}", context, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Unavailable(message)
        }
        _ => match err.as_service_error().and_then(|e| e.code()) {
            Some("ResourceNotFoundException") => StorageError::MissingResource(message),
            Some(code) if TRANSIENT_CODES.contains(&code) => StorageError::Unavailable(message),
            _ => StorageError::Backend(message),
        },
    }
}

fn build_error(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("invalid DynamoDB request: {}", err))
}

/// Amazon DynamoDB implementation of [`TableBackend`].
pub struct DynamoTableBackend {
    client: Client,
    name: String,
}

impl DynamoTableBackend {
    /// Connect using the default credential chain.
    ///
    /// `endpoint` targets DynamoDB Local or another compatible service.
    pub async fn connect(name: impl Into<String>, region: Option<&str>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;

        let client = if let Some(endpoint) = endpoint {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        let name = name.into();
        info!(backend = %name, "Connected to DynamoDB");
        Self::with_client(client, name)
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    async fn table_status(&self, table: &str) -> Result<Option<TableStatus>> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(output) => Ok(output.table().and_then(|t| t.table_status()).cloned()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_not_found_exception()) => {
                Ok(None)
            }
            Err(e) => Err(map_sdk_error("DescribeTable", e)),
        }
    }

    async fn wait_until_active(&self, table: &str) -> Result<()> {
        for _ in 0..TABLE_ACTIVE_POLLS {
            if self.table_status(table).await? == Some(TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(TABLE_ACTIVE_INTERVAL).await;
        }
        Err(StorageError::Unavailable(format!(
            "table {} did not become active",
            table
        )))
    }

    /// Sort key condition for `range`.
    ///
    /// A single bound maps to its exact operator. DynamoDB allows one sort
    /// key condition, so two bounds become an inclusive `BETWEEN`; exclusive
    /// ends are then dropped by the `RowRange::contains` filter in `query`.
    fn key_condition(range: &RowRange) -> (String, Vec<(&'static str, String)>) {
        match (&range.lower, &range.upper) {
            (Bound::Unbounded, Bound::Unbounded) => ("#pk = :pk".to_string(), Vec::new()),
            (Bound::Included(lo), Bound::Unbounded) => {
                ("#pk = :pk AND #rk >= :lo".to_string(), vec![(":lo", lo.clone())])
            }
            (Bound::Excluded(lo), Bound::Unbounded) => {
                ("#pk = :pk AND #rk > :lo".to_string(), vec![(":lo", lo.clone())])
            }
            (Bound::Unbounded, Bound::Included(hi)) => {
                ("#pk = :pk AND #rk <= :hi".to_string(), vec![(":hi", hi.clone())])
            }
            (Bound::Unbounded, Bound::Excluded(hi)) => {
                ("#pk = :pk AND #rk < :hi".to_string(), vec![(":hi", hi.clone())])
            }
            (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => (
                "#pk = :pk AND #rk BETWEEN :lo AND :hi".to_string(),
                vec![(":lo", lo.clone()), (":hi", hi.clone())],
            ),
        }
    }

    fn transact_item(table: &str, partition_key: &str, operation: TableOperation) -> Result<TransactWriteItem> {
        let item = match operation {
            TableOperation::Insert(entity) => TransactWriteItem::builder()
                .put(
                    Put::builder()
                        .table_name(table)
                        .set_item(Some(to_item(&entity)))
                        .condition_expression("attribute_not_exists(#pk)")
                        .expression_attribute_names("#pk", PK)
                        .build()
                        .map_err(build_error)?,
                )
                .build(),
            TableOperation::Replace(entity) => TransactWriteItem::builder()
                .put(
                    Put::builder()
                        .table_name(table)
                        .set_item(Some(to_item(&entity)))
                        .condition_expression("attribute_exists(#pk)")
                        .expression_attribute_names("#pk", PK)
                        .build()
                        .map_err(build_error)?,
                )
                .build(),
            TableOperation::Delete { row_key } => TransactWriteItem::builder()
                .delete(
                    Delete::builder()
                        .table_name(table)
                        .set_key(Some(key(partition_key, &row_key)))
                        .condition_expression("attribute_exists(#pk)")
                        .expression_attribute_names("#pk", PK)
                        .build()
                        .map_err(build_error)?,
                )
                .build(),
        };
        Ok(item)
    }

    /// Map a cancelled transaction to the first failed operation.
    fn cancellation_error(
        partition_key: &str,
        operations: &[(String, bool)],
        err: SdkError<TransactWriteItemsError, aws_sdk_dynamodb::config::http::HttpResponse>,
    ) -> StorageError {
        if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) =
            err.as_service_error()
        {
            for (index, reason) in cancelled.cancellation_reasons().iter().enumerate() {
                if reason.code() != Some("ConditionalCheckFailed") {
                    continue;
                }
                if let Some((row_key, is_insert)) = operations.get(index) {
                    return if *is_insert {
                        StorageError::Conflict {
                            partition_key: partition_key.to_string(),
                            row_key: row_key.clone(),
                        }
                    } else {
                        StorageError::NotFound {
                            partition_key: partition_key.to_string(),
                            row_key: row_key.clone(),
                        }
                    };
                }
            }
            if cancelled
                .cancellation_reasons()
                .iter()
                .any(|r| matches!(r.code(), Some("TransactionConflict" | "ThrottlingError")))
            {
                return StorageError::Unavailable(format!(
                    "TransactWriteItems: {}",
                    DisplayErrorContext(&err)
                ));
            }
        }
        map_sdk_error("TransactWriteItems", err)
    }
}

#[async_trait]
impl TableBackend for DynamoTableBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        if self.table_status(table).await?.is_some() {
            self.wait_until_active(table).await?;
            return Ok(false);
        }

        let result = self
            .client
            .create_table()
            .table_name(table)
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(PK)
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(build_error)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(RK)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(build_error)?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(PK)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_error)?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(RK)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_error)?,
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        let created = match result {
            Ok(_) => true,
            // Another process created it first.
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_in_use_exception()) => false,
            Err(e) => return Err(map_sdk_error("CreateTable", e)),
        };

        self.wait_until_active(table).await?;
        info!(backend = %self.name, table = %table, created, "DynamoDB table active");
        Ok(created)
    }

    async fn query(&self, table: &str, range: &RowRange) -> Result<Vec<TableEntity>> {
        let (condition, bounds) = Self::key_condition(range);
        let mut entities = Vec::new();
        let mut start_key = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(table)
                .key_condition_expression(&condition)
                .expression_attribute_names("#pk", PK)
                .expression_attribute_values(":pk", AttributeValue::S(range.partition_key.clone()))
                .consistent_read(true)
                .scan_index_forward(true)
                .set_exclusive_start_key(start_key.take());
            if !bounds.is_empty() {
                request = request.expression_attribute_names("#rk", RK);
            }
            for (placeholder, value) in &bounds {
                request = request.expression_attribute_values(*placeholder, AttributeValue::S(value.clone()));
            }

            let output = request.send().await.map_err(|e| map_sdk_error("Query", e))?;
            for item in output.items() {
                let entity = from_item(item)?;
                // Exclusive bounds are not expressible in one key condition.
                if range.contains(&entity.row_key) {
                    entities.push(entity);
                }
            }

            match output.last_evaluated_key() {
                Some(last) if !last.is_empty() => start_key = Some(last.clone()),
                _ => break,
            }
        }

        debug!(
            backend = %self.name,
            table = %table,
            partition_key = %range.partition_key,
            count = entities.len(),
            "DynamoDB query"
        );
        Ok(entities)
    }

    async fn retrieve(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key(partition_key, row_key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetItem", e))?;

        output.item().map(from_item).transpose()
    }

    async fn execute_batch(&self, table: &str, batch: TableBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if batch.len() > MAX_BATCH_OPERATIONS {
            return Err(StorageError::BatchTooLarge {
                size: batch.len(),
                limit: MAX_BATCH_OPERATIONS,
            });
        }

        let partition_key = batch.partition_key().to_string();
        let operations: Vec<(String, bool)> = batch
            .operations()
            .iter()
            .map(|op| (op.row_key().to_string(), matches!(op, TableOperation::Insert(_))))
            .collect();

        let mut items = Vec::with_capacity(batch.len());
        for operation in batch.into_operations() {
            items.push(Self::transact_item(table, &partition_key, operation)?);
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| Self::cancellation_error(&partition_key, &operations, e))?;

        debug!(
            backend = %self.name,
            table = %table,
            partition_key = %partition_key,
            count = operations.len(),
            "DynamoDB transaction committed"
        );
        Ok(())
    }
}
