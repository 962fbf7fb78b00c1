//! Model registry for replicated entities
//!
//! The registry is the single declarative description of everything the
//! engine replicates: one [`EntityDescriptor`] per target table carrying the
//! ordered column list, nullability, SQL read casts, sanitation flags and
//! the generated Avro wire schema. Loader construction, the completeness
//! check and the LOAD statements all iterate this structure; adding a table
//! means adding a descriptor here plus one step in the driver's plan.
//!
//! Heights, timestamps and balances are unbounded numerics at the source and
//! are carried as decimal strings end-to-end; enum and json columns are read
//! through a `::text` cast for the same reason. The registry is built once
//! per process and never mutated.

use std::collections::HashMap;
use std::sync::LazyLock;

use apache_avro::Schema;
use serde_json::json;
use tokio_postgres::Row;

use crate::error::Result;

/// Scalar field kinds of the wire schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-null UTF-8 string
    Str,
    /// Nullable UTF-8 string (Avro union `["string", "null"]`)
    OptStr,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Boolean
    Bool,
}

impl FieldKind {
    fn avro_type(self) -> serde_json::Value {
        match self {
            Self::Str => json!("string"),
            Self::OptStr => json!(["string", "null"]),
            Self::Int => json!("int"),
            Self::Long => json!("long"),
            Self::Bool => json!("boolean"),
        }
    }
}

/// One column of a replicated entity
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Column name, identical on source and target
    pub column: &'static str,
    /// Wire schema kind
    pub kind: FieldKind,
    /// Read through `column::text AS column` (numeric / enum / json source
    /// columns; values stay decimal strings end-to-end)
    pub cast: bool,
    /// Replace non-BMP codepoints before encoding
    pub sanitize: bool,
}

impl FieldDef {
    /// Plain text column
    const fn text(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::Str,
            cast: false,
            sanitize: false,
        }
    }

    /// Nullable text column
    const fn opt_text(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::OptStr,
            cast: false,
            sanitize: false,
        }
    }

    /// Numeric, enum or json column read via `::text`
    const fn cast(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::Str,
            cast: true,
            sanitize: false,
        }
    }

    /// Nullable column read via `::text`
    const fn opt_cast(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::OptStr,
            cast: true,
            sanitize: false,
        }
    }

    /// Free-text payload column: read via `::text`, sanitized to the Basic
    /// Multilingual Plane before encoding
    const fn payload(column: &'static str) -> Self {
        Self {
            column,
            kind: FieldKind::Str,
            cast: true,
            sanitize: true,
        }
    }
}

/// A typed scalar value of a record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    OptStr(Option<String>),
    Int(i32),
    Long(i64),
    Bool(bool),
}

/// One row in the registry's record layout for its table
#[derive(Debug, Clone, PartialEq)]
pub struct Record(pub Vec<Value>);

/// A replicated entity: a typed record bound to one registry descriptor
pub trait Entity: Sized + Send + 'static {
    /// Target table name
    const TABLE: &'static str;

    /// Extract one entity from a source row produced by the registry's
    /// select list
    fn from_row(row: &Row) -> Result<Self>;

    /// Deterministic fingerprint used only by the driver to parameterize
    /// dependent queries
    fn key(&self) -> String;

    /// Ordered values matching the registry's record layout
    fn record(&self) -> Record;
}

/// Everything the loader needs to open a bulk-load stream for one table
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Target table name
    pub table: &'static str,
    /// Avro record name
    pub record_name: &'static str,
    /// Ordered column list matching the target's column order
    pub fields: &'static [FieldDef],
    schema_json: String,
    schema: Schema,
}

impl EntityDescriptor {
    fn new(table: &'static str, record_name: &'static str, fields: &'static [FieldDef]) -> Self {
        let schema_json = avro_schema_json(record_name, fields);
        let schema =
            Schema::parse_str(&schema_json).expect("generated Avro schema is valid - this is a bug");
        Self {
            table,
            record_name,
            fields,
            schema_json,
            schema,
        }
    }

    /// Parsed Avro record schema for the encoder
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Schema JSON embedded in the LOAD statement
    pub fn schema_json(&self) -> &str {
        &self.schema_json
    }

    /// SELECT list reading every column, casting where declared
    pub fn select_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                if f.cast {
                    format!("{0}::text AS {0}", f.column)
                } else {
                    f.column.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column-to-field mapping clause of the LOAD statement
    pub fn column_mapping(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{0} <- {0}", f.column))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn avro_schema_json(record_name: &str, fields: &[FieldDef]) -> String {
    let fields: Vec<serde_json::Value> = fields
        .iter()
        .map(|f| json!({ "name": f.column, "type": f.kind.avro_type() }))
        .collect();

    json!({
        "type": "record",
        "name": record_name,
        "namespace": "chainsink",
        "fields": fields,
    })
    .to_string()
}

const ACCESS_KEY_FIELDS: &[FieldDef] = &[
    FieldDef::text("public_key"),
    FieldDef::text("account_id"),
    FieldDef::opt_text("created_by_receipt_id"),
    FieldDef::opt_text("deleted_by_receipt_id"),
    FieldDef::cast("permission_kind"),
    FieldDef::cast("last_update_block_height"),
];

const ACCOUNT_CHANGE_FIELDS: &[FieldDef] = &[
    FieldDef::cast("id"),
    FieldDef::text("affected_account_id"),
    FieldDef::cast("changed_in_block_timestamp"),
    FieldDef::text("changed_in_block_hash"),
    FieldDef::opt_text("caused_by_transaction_hash"),
    FieldDef::opt_text("caused_by_receipt_id"),
    FieldDef::cast("update_reason"),
    FieldDef::cast("affected_account_nonstaked_balance"),
    FieldDef::cast("affected_account_staked_balance"),
    FieldDef::cast("affected_account_storage_usage"),
];

const ACCOUNT_FIELDS: &[FieldDef] = &[
    FieldDef::cast("id"),
    FieldDef::text("account_id"),
    FieldDef::opt_text("created_by_receipt_id"),
    FieldDef::opt_text("deleted_by_receipt_id"),
    FieldDef::cast("last_update_block_height"),
];

const ACTION_RECEIPT_ACTION_FIELDS: &[FieldDef] = &[
    FieldDef::text("receipt_id"),
    FieldDef::cast("index_in_action_receipt"),
    FieldDef::cast("action_kind"),
    FieldDef::payload("args"),
    FieldDef::text("receipt_predecessor_account_id"),
    FieldDef::text("receipt_receiver_account_id"),
    FieldDef::cast("receipt_included_in_block_timestamp"),
];

const ACTION_RECEIPT_INPUT_DATA_FIELDS: &[FieldDef] = &[
    FieldDef::text("input_data_id"),
    FieldDef::text("input_to_receipt_id"),
];

const ACTION_RECEIPT_OUTPUT_DATA_FIELDS: &[FieldDef] = &[
    FieldDef::text("output_data_id"),
    FieldDef::text("output_from_receipt_id"),
    FieldDef::text("receiver_account_id"),
];

const ACTION_RECEIPT_FIELDS: &[FieldDef] = &[
    FieldDef::text("receipt_id"),
    FieldDef::text("signer_account_id"),
    FieldDef::text("signer_public_key"),
    FieldDef::cast("gas_price"),
];

const BLOCK_FIELDS: &[FieldDef] = &[
    FieldDef::cast("block_height"),
    FieldDef::text("block_hash"),
    FieldDef::text("prev_block_hash"),
    FieldDef::cast("block_timestamp"),
    FieldDef::cast("total_supply"),
    FieldDef::cast("gas_price"),
    FieldDef::text("author_account_id"),
];

const CHUNK_FIELDS: &[FieldDef] = &[
    FieldDef::text("included_in_block_hash"),
    FieldDef::text("chunk_hash"),
    FieldDef::cast("shard_id"),
    FieldDef::text("signature"),
    FieldDef::cast("gas_limit"),
    FieldDef::cast("gas_used"),
    FieldDef::text("author_account_id"),
];

const DATA_RECEIPT_FIELDS: &[FieldDef] = &[
    FieldDef::text("data_id"),
    FieldDef::text("receipt_id"),
    FieldDef::opt_cast("data"),
];

const EXECUTION_OUTCOME_RECEIPT_FIELDS: &[FieldDef] = &[
    FieldDef::text("executed_receipt_id"),
    FieldDef::cast("index_in_execution_outcome"),
    FieldDef::text("produced_receipt_id"),
];

const EXECUTION_OUTCOME_FIELDS: &[FieldDef] = &[
    FieldDef::text("receipt_id"),
    FieldDef::text("executed_in_block_hash"),
    FieldDef::cast("executed_in_block_timestamp"),
    FieldDef::cast("index_in_chunk"),
    FieldDef::cast("gas_burnt"),
    FieldDef::cast("tokens_burnt"),
    FieldDef::text("executor_account_id"),
    FieldDef::cast("status"),
    FieldDef::cast("shard_id"),
];

const RECEIPT_FIELDS: &[FieldDef] = &[
    FieldDef::text("receipt_id"),
    FieldDef::text("included_in_block_hash"),
    FieldDef::text("included_in_chunk_hash"),
    FieldDef::cast("index_in_chunk"),
    FieldDef::cast("included_in_block_timestamp"),
    FieldDef::text("predecessor_account_id"),
    FieldDef::text("receiver_account_id"),
    FieldDef::cast("receipt_kind"),
    FieldDef::text("originated_from_transaction_hash"),
];

const TRANSACTION_ACTION_FIELDS: &[FieldDef] = &[
    FieldDef::text("transaction_hash"),
    FieldDef::cast("index_in_transaction"),
    FieldDef::cast("action_kind"),
    FieldDef::payload("args"),
];

const TRANSACTION_FIELDS: &[FieldDef] = &[
    FieldDef::text("transaction_hash"),
    FieldDef::text("included_in_block_hash"),
    FieldDef::text("included_in_chunk_hash"),
    FieldDef::cast("index_in_chunk"),
    FieldDef::cast("block_timestamp"),
    FieldDef::text("signer_account_id"),
    FieldDef::text("signer_public_key"),
    FieldDef::cast("nonce"),
    FieldDef::text("receiver_account_id"),
    FieldDef::text("signature"),
    FieldDef::cast("status"),
    FieldDef::text("converted_into_receipt_id"),
    FieldDef::cast("receipt_conversion_gas_burnt"),
    FieldDef::cast("receipt_conversion_tokens_burnt"),
];

/// Declared entity set: (table, record name, fields)
const DECLARED: &[(&str, &str, &[FieldDef])] = &[
    ("access_keys", "AccessKey", ACCESS_KEY_FIELDS),
    ("account_changes", "AccountChange", ACCOUNT_CHANGE_FIELDS),
    ("accounts", "Account", ACCOUNT_FIELDS),
    (
        "action_receipt_actions",
        "ActionReceiptAction",
        ACTION_RECEIPT_ACTION_FIELDS,
    ),
    (
        "action_receipt_input_data",
        "ActionReceiptInputData",
        ACTION_RECEIPT_INPUT_DATA_FIELDS,
    ),
    (
        "action_receipt_output_data",
        "ActionReceiptOutputData",
        ACTION_RECEIPT_OUTPUT_DATA_FIELDS,
    ),
    ("action_receipts", "ActionReceipt", ACTION_RECEIPT_FIELDS),
    ("blocks", "Block", BLOCK_FIELDS),
    ("chunks", "Chunk", CHUNK_FIELDS),
    ("data_receipts", "DataReceipt", DATA_RECEIPT_FIELDS),
    (
        "execution_outcome_receipts",
        "ExecutionOutcomeReceipt",
        EXECUTION_OUTCOME_RECEIPT_FIELDS,
    ),
    (
        "execution_outcomes",
        "ExecutionOutcome",
        EXECUTION_OUTCOME_FIELDS,
    ),
    ("receipts", "Receipt", RECEIPT_FIELDS),
    (
        "transaction_actions",
        "TransactionAction",
        TRANSACTION_ACTION_FIELDS,
    ),
    ("transactions", "Transaction", TRANSACTION_FIELDS),
];

/// Process-global registry of all replicated entities
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The declared entity set, indexed by table name
pub struct Registry {
    descriptors: Vec<EntityDescriptor>,
    by_table: HashMap<&'static str, usize>,
}

impl Registry {
    fn new() -> Self {
        let descriptors: Vec<EntityDescriptor> = DECLARED
            .iter()
            .map(|&(table, record_name, fields)| EntityDescriptor::new(table, record_name, fields))
            .collect();
        let by_table = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.table, i))
            .collect();
        Self {
            descriptors,
            by_table,
        }
    }

    /// All declared descriptors, in declaration order
    pub fn descriptors(&self) -> &[EntityDescriptor] {
        &self.descriptors
    }

    /// Descriptor for a table, if declared
    pub fn get(&self, table: &str) -> Option<&EntityDescriptor> {
        self.by_table.get(table).map(|&i| &self.descriptors[i])
    }

    /// Descriptor for a declared table; panics on an undeclared one.
    /// Only for compiled-in table names.
    pub fn expect(&self, table: &str) -> &EntityDescriptor {
        self.get(table)
            .unwrap_or_else(|| panic!("table {table} is not declared in the registry"))
    }

    /// Number of declared tables
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty (it never is in production)
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AccessKey {
    pub public_key: String,
    pub account_id: String,
    pub created_by_receipt_id: Option<String>,
    pub deleted_by_receipt_id: Option<String>,
    pub permission_kind: String,
    pub last_update_block_height: String,
}

impl Entity for AccessKey {
    const TABLE: &'static str = "access_keys";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            public_key: row.try_get("public_key")?,
            account_id: row.try_get("account_id")?,
            created_by_receipt_id: row.try_get("created_by_receipt_id")?,
            deleted_by_receipt_id: row.try_get("deleted_by_receipt_id")?,
            permission_kind: row.try_get("permission_kind")?,
            last_update_block_height: row.try_get("last_update_block_height")?,
        })
    }

    fn key(&self) -> String {
        format!("{}:{}", self.public_key, self.account_id)
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.public_key.clone()),
            Value::Str(self.account_id.clone()),
            Value::OptStr(self.created_by_receipt_id.clone()),
            Value::OptStr(self.deleted_by_receipt_id.clone()),
            Value::Str(self.permission_kind.clone()),
            Value::Str(self.last_update_block_height.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct AccountChange {
    pub id: String,
    pub affected_account_id: String,
    pub changed_in_block_timestamp: String,
    pub changed_in_block_hash: String,
    pub caused_by_transaction_hash: Option<String>,
    pub caused_by_receipt_id: Option<String>,
    pub update_reason: String,
    pub affected_account_nonstaked_balance: String,
    pub affected_account_staked_balance: String,
    pub affected_account_storage_usage: String,
}

impl Entity for AccountChange {
    const TABLE: &'static str = "account_changes";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            affected_account_id: row.try_get("affected_account_id")?,
            changed_in_block_timestamp: row.try_get("changed_in_block_timestamp")?,
            changed_in_block_hash: row.try_get("changed_in_block_hash")?,
            caused_by_transaction_hash: row.try_get("caused_by_transaction_hash")?,
            caused_by_receipt_id: row.try_get("caused_by_receipt_id")?,
            update_reason: row.try_get("update_reason")?,
            affected_account_nonstaked_balance: row.try_get("affected_account_nonstaked_balance")?,
            affected_account_staked_balance: row.try_get("affected_account_staked_balance")?,
            affected_account_storage_usage: row.try_get("affected_account_storage_usage")?,
        })
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.id.clone()),
            Value::Str(self.affected_account_id.clone()),
            Value::Str(self.changed_in_block_timestamp.clone()),
            Value::Str(self.changed_in_block_hash.clone()),
            Value::OptStr(self.caused_by_transaction_hash.clone()),
            Value::OptStr(self.caused_by_receipt_id.clone()),
            Value::Str(self.update_reason.clone()),
            Value::Str(self.affected_account_nonstaked_balance.clone()),
            Value::Str(self.affected_account_staked_balance.clone()),
            Value::Str(self.affected_account_storage_usage.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub account_id: String,
    pub created_by_receipt_id: Option<String>,
    pub deleted_by_receipt_id: Option<String>,
    pub last_update_block_height: String,
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            created_by_receipt_id: row.try_get("created_by_receipt_id")?,
            deleted_by_receipt_id: row.try_get("deleted_by_receipt_id")?,
            last_update_block_height: row.try_get("last_update_block_height")?,
        })
    }

    fn key(&self) -> String {
        self.id.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.id.clone()),
            Value::Str(self.account_id.clone()),
            Value::OptStr(self.created_by_receipt_id.clone()),
            Value::OptStr(self.deleted_by_receipt_id.clone()),
            Value::Str(self.last_update_block_height.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ActionReceiptAction {
    pub receipt_id: String,
    pub index_in_action_receipt: String,
    pub action_kind: String,
    pub args: String,
    pub receipt_predecessor_account_id: String,
    pub receipt_receiver_account_id: String,
    pub receipt_included_in_block_timestamp: String,
}

impl Entity for ActionReceiptAction {
    const TABLE: &'static str = "action_receipt_actions";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            receipt_id: row.try_get("receipt_id")?,
            index_in_action_receipt: row.try_get("index_in_action_receipt")?,
            action_kind: row.try_get("action_kind")?,
            args: row.try_get("args")?,
            receipt_predecessor_account_id: row.try_get("receipt_predecessor_account_id")?,
            receipt_receiver_account_id: row.try_get("receipt_receiver_account_id")?,
            receipt_included_in_block_timestamp: row
                .try_get("receipt_included_in_block_timestamp")?,
        })
    }

    fn key(&self) -> String {
        format!("{}:{}", self.receipt_id, self.index_in_action_receipt)
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.receipt_id.clone()),
            Value::Str(self.index_in_action_receipt.clone()),
            Value::Str(self.action_kind.clone()),
            Value::Str(self.args.clone()),
            Value::Str(self.receipt_predecessor_account_id.clone()),
            Value::Str(self.receipt_receiver_account_id.clone()),
            Value::Str(self.receipt_included_in_block_timestamp.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ActionReceiptInputData {
    pub input_data_id: String,
    pub input_to_receipt_id: String,
}

impl Entity for ActionReceiptInputData {
    const TABLE: &'static str = "action_receipt_input_data";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            input_data_id: row.try_get("input_data_id")?,
            input_to_receipt_id: row.try_get("input_to_receipt_id")?,
        })
    }

    fn key(&self) -> String {
        format!("{}:{}", self.input_data_id, self.input_to_receipt_id)
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.input_data_id.clone()),
            Value::Str(self.input_to_receipt_id.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ActionReceiptOutputData {
    pub output_data_id: String,
    pub output_from_receipt_id: String,
    pub receiver_account_id: String,
}

impl Entity for ActionReceiptOutputData {
    const TABLE: &'static str = "action_receipt_output_data";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            output_data_id: row.try_get("output_data_id")?,
            output_from_receipt_id: row.try_get("output_from_receipt_id")?,
            receiver_account_id: row.try_get("receiver_account_id")?,
        })
    }

    fn key(&self) -> String {
        format!("{}:{}", self.output_data_id, self.output_from_receipt_id)
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.output_data_id.clone()),
            Value::Str(self.output_from_receipt_id.clone()),
            Value::Str(self.receiver_account_id.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ActionReceipt {
    pub receipt_id: String,
    pub signer_account_id: String,
    pub signer_public_key: String,
    pub gas_price: String,
}

impl Entity for ActionReceipt {
    const TABLE: &'static str = "action_receipts";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            receipt_id: row.try_get("receipt_id")?,
            signer_account_id: row.try_get("signer_account_id")?,
            signer_public_key: row.try_get("signer_public_key")?,
            gas_price: row.try_get("gas_price")?,
        })
    }

    fn key(&self) -> String {
        self.receipt_id.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.receipt_id.clone()),
            Value::Str(self.signer_account_id.clone()),
            Value::Str(self.signer_public_key.clone()),
            Value::Str(self.gas_price.clone()),
        ])
    }
}

/// The root of the dependency graph; every other entity in a batch hangs off
/// the hashes collected while streaming blocks.
#[derive(Debug, Clone)]
pub struct Block {
    pub block_height: String,
    pub block_hash: String,
    pub prev_block_hash: String,
    pub block_timestamp: String,
    pub total_supply: String,
    pub gas_price: String,
    pub author_account_id: String,
}

impl Entity for Block {
    const TABLE: &'static str = "blocks";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            block_height: row.try_get("block_height")?,
            block_hash: row.try_get("block_hash")?,
            prev_block_hash: row.try_get("prev_block_hash")?,
            block_timestamp: row.try_get("block_timestamp")?,
            total_supply: row.try_get("total_supply")?,
            gas_price: row.try_get("gas_price")?,
            author_account_id: row.try_get("author_account_id")?,
        })
    }

    fn key(&self) -> String {
        self.block_hash.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.block_height.clone()),
            Value::Str(self.block_hash.clone()),
            Value::Str(self.prev_block_hash.clone()),
            Value::Str(self.block_timestamp.clone()),
            Value::Str(self.total_supply.clone()),
            Value::Str(self.gas_price.clone()),
            Value::Str(self.author_account_id.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub included_in_block_hash: String,
    pub chunk_hash: String,
    pub shard_id: String,
    pub signature: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub author_account_id: String,
}

impl Entity for Chunk {
    const TABLE: &'static str = "chunks";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            included_in_block_hash: row.try_get("included_in_block_hash")?,
            chunk_hash: row.try_get("chunk_hash")?,
            shard_id: row.try_get("shard_id")?,
            signature: row.try_get("signature")?,
            gas_limit: row.try_get("gas_limit")?,
            gas_used: row.try_get("gas_used")?,
            author_account_id: row.try_get("author_account_id")?,
        })
    }

    fn key(&self) -> String {
        self.chunk_hash.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.included_in_block_hash.clone()),
            Value::Str(self.chunk_hash.clone()),
            Value::Str(self.shard_id.clone()),
            Value::Str(self.signature.clone()),
            Value::Str(self.gas_limit.clone()),
            Value::Str(self.gas_used.clone()),
            Value::Str(self.author_account_id.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct DataReceipt {
    pub data_id: String,
    pub receipt_id: String,
    pub data: Option<String>,
}

impl Entity for DataReceipt {
    const TABLE: &'static str = "data_receipts";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            data_id: row.try_get("data_id")?,
            receipt_id: row.try_get("receipt_id")?,
            data: row.try_get("data")?,
        })
    }

    fn key(&self) -> String {
        self.data_id.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.data_id.clone()),
            Value::Str(self.receipt_id.clone()),
            Value::OptStr(self.data.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcomeReceipt {
    pub executed_receipt_id: String,
    pub index_in_execution_outcome: String,
    pub produced_receipt_id: String,
}

impl Entity for ExecutionOutcomeReceipt {
    const TABLE: &'static str = "execution_outcome_receipts";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            executed_receipt_id: row.try_get("executed_receipt_id")?,
            index_in_execution_outcome: row.try_get("index_in_execution_outcome")?,
            produced_receipt_id: row.try_get("produced_receipt_id")?,
        })
    }

    fn key(&self) -> String {
        format!(
            "{}:{}",
            self.executed_receipt_id, self.index_in_execution_outcome
        )
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.executed_receipt_id.clone()),
            Value::Str(self.index_in_execution_outcome.clone()),
            Value::Str(self.produced_receipt_id.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub receipt_id: String,
    pub executed_in_block_hash: String,
    pub executed_in_block_timestamp: String,
    pub index_in_chunk: String,
    pub gas_burnt: String,
    pub tokens_burnt: String,
    pub executor_account_id: String,
    pub status: String,
    pub shard_id: String,
}

impl Entity for ExecutionOutcome {
    const TABLE: &'static str = "execution_outcomes";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            receipt_id: row.try_get("receipt_id")?,
            executed_in_block_hash: row.try_get("executed_in_block_hash")?,
            executed_in_block_timestamp: row.try_get("executed_in_block_timestamp")?,
            index_in_chunk: row.try_get("index_in_chunk")?,
            gas_burnt: row.try_get("gas_burnt")?,
            tokens_burnt: row.try_get("tokens_burnt")?,
            executor_account_id: row.try_get("executor_account_id")?,
            status: row.try_get("status")?,
            shard_id: row.try_get("shard_id")?,
        })
    }

    fn key(&self) -> String {
        self.receipt_id.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.receipt_id.clone()),
            Value::Str(self.executed_in_block_hash.clone()),
            Value::Str(self.executed_in_block_timestamp.clone()),
            Value::Str(self.index_in_chunk.clone()),
            Value::Str(self.gas_burnt.clone()),
            Value::Str(self.tokens_burnt.clone()),
            Value::Str(self.executor_account_id.clone()),
            Value::Str(self.status.clone()),
            Value::Str(self.shard_id.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub receipt_id: String,
    pub included_in_block_hash: String,
    pub included_in_chunk_hash: String,
    pub index_in_chunk: String,
    pub included_in_block_timestamp: String,
    pub predecessor_account_id: String,
    pub receiver_account_id: String,
    pub receipt_kind: String,
    pub originated_from_transaction_hash: String,
}

impl Entity for Receipt {
    const TABLE: &'static str = "receipts";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            receipt_id: row.try_get("receipt_id")?,
            included_in_block_hash: row.try_get("included_in_block_hash")?,
            included_in_chunk_hash: row.try_get("included_in_chunk_hash")?,
            index_in_chunk: row.try_get("index_in_chunk")?,
            included_in_block_timestamp: row.try_get("included_in_block_timestamp")?,
            predecessor_account_id: row.try_get("predecessor_account_id")?,
            receiver_account_id: row.try_get("receiver_account_id")?,
            receipt_kind: row.try_get("receipt_kind")?,
            originated_from_transaction_hash: row.try_get("originated_from_transaction_hash")?,
        })
    }

    fn key(&self) -> String {
        self.receipt_id.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.receipt_id.clone()),
            Value::Str(self.included_in_block_hash.clone()),
            Value::Str(self.included_in_chunk_hash.clone()),
            Value::Str(self.index_in_chunk.clone()),
            Value::Str(self.included_in_block_timestamp.clone()),
            Value::Str(self.predecessor_account_id.clone()),
            Value::Str(self.receiver_account_id.clone()),
            Value::Str(self.receipt_kind.clone()),
            Value::Str(self.originated_from_transaction_hash.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct TransactionAction {
    pub transaction_hash: String,
    pub index_in_transaction: String,
    pub action_kind: String,
    pub args: String,
}

impl Entity for TransactionAction {
    const TABLE: &'static str = "transaction_actions";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            transaction_hash: row.try_get("transaction_hash")?,
            index_in_transaction: row.try_get("index_in_transaction")?,
            action_kind: row.try_get("action_kind")?,
            args: row.try_get("args")?,
        })
    }

    fn key(&self) -> String {
        self.transaction_hash.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.transaction_hash.clone()),
            Value::Str(self.index_in_transaction.clone()),
            Value::Str(self.action_kind.clone()),
            Value::Str(self.args.clone()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_hash: String,
    pub included_in_block_hash: String,
    pub included_in_chunk_hash: String,
    pub index_in_chunk: String,
    pub block_timestamp: String,
    pub signer_account_id: String,
    pub signer_public_key: String,
    pub nonce: String,
    pub receiver_account_id: String,
    pub signature: String,
    pub status: String,
    pub converted_into_receipt_id: String,
    pub receipt_conversion_gas_burnt: String,
    pub receipt_conversion_tokens_burnt: String,
}

impl Entity for Transaction {
    const TABLE: &'static str = "transactions";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            transaction_hash: row.try_get("transaction_hash")?,
            included_in_block_hash: row.try_get("included_in_block_hash")?,
            included_in_chunk_hash: row.try_get("included_in_chunk_hash")?,
            index_in_chunk: row.try_get("index_in_chunk")?,
            block_timestamp: row.try_get("block_timestamp")?,
            signer_account_id: row.try_get("signer_account_id")?,
            signer_public_key: row.try_get("signer_public_key")?,
            nonce: row.try_get("nonce")?,
            receiver_account_id: row.try_get("receiver_account_id")?,
            signature: row.try_get("signature")?,
            status: row.try_get("status")?,
            converted_into_receipt_id: row.try_get("converted_into_receipt_id")?,
            receipt_conversion_gas_burnt: row.try_get("receipt_conversion_gas_burnt")?,
            receipt_conversion_tokens_burnt: row.try_get("receipt_conversion_tokens_burnt")?,
        })
    }

    fn key(&self) -> String {
        self.transaction_hash.clone()
    }

    fn record(&self) -> Record {
        Record(vec![
            Value::Str(self.transaction_hash.clone()),
            Value::Str(self.included_in_block_hash.clone()),
            Value::Str(self.included_in_chunk_hash.clone()),
            Value::Str(self.index_in_chunk.clone()),
            Value::Str(self.block_timestamp.clone()),
            Value::Str(self.signer_account_id.clone()),
            Value::Str(self.signer_public_key.clone()),
            Value::Str(self.nonce.clone()),
            Value::Str(self.receiver_account_id.clone()),
            Value::Str(self.signature.clone()),
            Value::Str(self.status.clone()),
            Value::Str(self.converted_into_receipt_id.clone()),
            Value::Str(self.receipt_conversion_gas_burnt.clone()),
            Value::Str(self.receipt_conversion_tokens_burnt.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            block_height: "100".into(),
            block_hash: "hash-100".into(),
            prev_block_hash: "hash-99".into(),
            block_timestamp: "1600000000000000000".into(),
            total_supply: "1000000000000000000000000000".into(),
            gas_price: "100000000".into(),
            author_account_id: "validator.near".into(),
        }
    }

    #[test]
    fn test_registry_declares_all_tables() {
        assert_eq!(REGISTRY.len(), 15);
        assert!(!REGISTRY.is_empty());
        for (table, _, _) in DECLARED {
            assert!(REGISTRY.get(table).is_some(), "missing table {table}");
        }
    }

    #[test]
    fn test_registry_rejects_unknown_table() {
        assert!(REGISTRY.get("no_such_table").is_none());
        assert!(REGISTRY.get("Blocks").is_none()); // exact-name routing
    }

    #[test]
    #[should_panic(expected = "not declared")]
    fn test_registry_expect_panics_on_unknown_table() {
        REGISTRY.expect("no_such_table");
    }

    #[test]
    fn test_schema_json_shape() {
        let desc = REGISTRY.expect("blocks");
        let schema: serde_json::Value = serde_json::from_str(desc.schema_json()).unwrap();
        assert_eq!(schema["type"], "record");
        assert_eq!(schema["name"], "Block");
        assert_eq!(schema["namespace"], "chainsink");
        assert_eq!(schema["fields"].as_array().unwrap().len(), 7);
        assert_eq!(schema["fields"][0]["name"], "block_height");
        assert_eq!(schema["fields"][0]["type"], "string");
    }

    #[test]
    fn test_nullable_fields_are_string_null_unions() {
        let desc = REGISTRY.expect("data_receipts");
        let schema: serde_json::Value = serde_json::from_str(desc.schema_json()).unwrap();
        let data_field = &schema["fields"][2];
        assert_eq!(data_field["name"], "data");
        assert_eq!(data_field["type"], serde_json::json!(["string", "null"]));
    }

    #[test]
    fn test_all_schemas_parse() {
        for desc in REGISTRY.descriptors() {
            // Schema::parse_str already ran during registry construction;
            // make the invariant explicit here.
            assert!(apache_avro::Schema::parse_str(desc.schema_json()).is_ok());
        }
    }

    #[test]
    fn test_select_list_casts_numeric_columns() {
        let list = REGISTRY.expect("blocks").select_list();
        assert!(list.contains("block_height::text AS block_height"));
        assert!(list.contains("total_supply::text AS total_supply"));
        // plain text columns are not cast
        assert!(list.contains("block_hash"));
        assert!(!list.contains("block_hash::text"));
    }

    #[test]
    fn test_column_mapping_covers_every_field() {
        let desc = REGISTRY.expect("transactions");
        let mapping = desc.column_mapping();
        assert_eq!(mapping.matches(" <- ").count(), desc.fields.len());
        assert!(mapping.contains("transaction_hash <- transaction_hash"));
    }

    #[test]
    fn test_sanitized_fields_are_exactly_the_arg_payloads() {
        let mut flagged = Vec::new();
        for desc in REGISTRY.descriptors() {
            for field in desc.fields {
                if field.sanitize {
                    flagged.push((desc.table, field.column));
                }
            }
        }
        assert_eq!(
            flagged,
            vec![
                ("action_receipt_actions", "args"),
                ("transaction_actions", "args"),
            ]
        );
    }

    #[test]
    fn test_key_derivations() {
        let block = sample_block();
        assert_eq!(block.key(), "hash-100");

        let access_key = AccessKey {
            public_key: "ed25519:abc".into(),
            account_id: "alice.near".into(),
            created_by_receipt_id: None,
            deleted_by_receipt_id: None,
            permission_kind: "FULL_ACCESS".into(),
            last_update_block_height: "100".into(),
        };
        assert_eq!(access_key.key(), "ed25519:abc:alice.near");

        let outcome_receipt = ExecutionOutcomeReceipt {
            executed_receipt_id: "r1".into(),
            index_in_execution_outcome: "3".into(),
            produced_receipt_id: "r2".into(),
        };
        assert_eq!(outcome_receipt.key(), "r1:3");
    }

    #[test]
    fn test_record_layout_matches_descriptor() {
        let block = sample_block();
        assert_eq!(
            block.record().0.len(),
            REGISTRY.expect(Block::TABLE).fields.len()
        );

        let data_receipt = DataReceipt {
            data_id: "d1".into(),
            receipt_id: "r1".into(),
            data: None,
        };
        let record = data_receipt.record();
        assert_eq!(
            record.0.len(),
            REGISTRY.expect(DataReceipt::TABLE).fields.len()
        );
        assert_eq!(record.0[2], Value::OptStr(None));
    }
}
