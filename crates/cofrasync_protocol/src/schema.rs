//! Typed payloads for the brotherhood office tables.
//!
//! Sync treats payloads as opaque bytes. This module is the boundary where
//! they get a shape: one struct per table, each declaring the records it
//! references, and [`EntityPayload`] as the closed set of all of them.

use crate::codec::{from_cbor, to_cbor};
use crate::error::{ProtocolError, ProtocolResult};
use crate::id::RecordId;
use crate::table::{TableName, TableSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `people` table.
pub const PEOPLE: &str = "people";
/// `price_lists` table.
pub const PRICE_LISTS: &str = "price_lists";
/// `receipts` table.
pub const RECEIPTS: &str = "receipts";
/// `payments` table.
pub const PAYMENTS: &str = "payments";
/// `procession_assignments` table.
pub const PROCESSION_ASSIGNMENTS: &str = "procession_assignments";

/// A payload type bound to one table.
pub trait TableSchema: Serialize + DeserializeOwned {
    /// Table the payload belongs to.
    const TABLE: &'static str;

    /// `(table, id)` pairs of records this payload points at.
    fn references(&self) -> Vec<(&'static str, RecordId)> {
        Vec::new()
    }

    /// Encodes into record payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an encode error if serialization fails.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from record payload bytes.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the bytes are not this schema.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// A brother or sister of the confraternity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Full name.
    pub full_name: String,
    /// National identity document, if on file.
    pub national_id: Option<String>,
    /// Membership number.
    pub member_number: u32,
    /// Date of admission, `YYYY-MM-DD`.
    pub joined_on: String,
    /// Whether the membership is current.
    pub active: bool,
}

impl TableSchema for Person {
    const TABLE: &'static str = PEOPLE;
}

/// One priced concept of a price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceItem {
    /// Concept, e.g. the yearly fee.
    pub concept: String,
    /// Amount in cents.
    pub amount_cents: i64,
}

/// Fees in force for a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    /// Display name.
    pub name: String,
    /// Year the prices apply to.
    pub year: u16,
    /// Priced concepts.
    pub items: Vec<PriceItem>,
}

impl TableSchema for PriceList {
    const TABLE: &'static str = PRICE_LISTS;
}

/// A receipt issued to a person against a price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Person billed.
    pub person_id: RecordId,
    /// Price list the amount comes from.
    pub price_list_id: RecordId,
    /// Receipt number within the year.
    pub number: u32,
    /// Issue date, `YYYY-MM-DD`.
    pub issued_on: String,
    /// Concept.
    pub concept: String,
    /// Amount in cents.
    pub amount_cents: i64,
}

impl TableSchema for Receipt {
    const TABLE: &'static str = RECEIPTS;

    fn references(&self) -> Vec<(&'static str, RecordId)> {
        vec![(PEOPLE, self.person_id), (PRICE_LISTS, self.price_list_id)]
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash at the office.
    Cash,
    /// Bank transfer or direct debit.
    Transfer,
    /// Card.
    Card,
}

/// A payment settling (part of) a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Receipt being paid.
    pub receipt_id: RecordId,
    /// Person paying.
    pub person_id: RecordId,
    /// Amount in cents.
    pub amount_cents: i64,
    /// Payment date, `YYYY-MM-DD`.
    pub paid_on: String,
    /// Method.
    pub method: PaymentMethod,
}

impl TableSchema for Payment {
    const TABLE: &'static str = PAYMENTS;

    fn references(&self) -> Vec<(&'static str, RecordId)> {
        vec![(RECEIPTS, self.receipt_id), (PEOPLE, self.person_id)]
    }
}

/// A person's place in a procession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessionAssignment {
    /// Person assigned.
    pub person_id: RecordId,
    /// Procession name.
    pub procession: String,
    /// Section or post, e.g. "nazareno, tramo 3".
    pub position: String,
    /// Year.
    pub year: u16,
}

impl TableSchema for ProcessionAssignment {
    const TABLE: &'static str = PROCESSION_ASSIGNMENTS;

    fn references(&self) -> Vec<(&'static str, RecordId)> {
        vec![(PEOPLE, self.person_id)]
    }
}

/// Any payload of the standard tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPayload {
    /// `people`.
    Person(Person),
    /// `price_lists`.
    PriceList(PriceList),
    /// `receipts`.
    Receipt(Receipt),
    /// `payments`.
    Payment(Payment),
    /// `procession_assignments`.
    ProcessionAssignment(ProcessionAssignment),
}

impl EntityPayload {
    /// Decodes `bytes` with the schema of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownTable`] for tables outside the set,
    /// or a decode error.
    pub fn decode(table: &str, bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(match table {
            PEOPLE => Self::Person(Person::decode(bytes)?),
            PRICE_LISTS => Self::PriceList(PriceList::decode(bytes)?),
            RECEIPTS => Self::Receipt(Receipt::decode(bytes)?),
            PAYMENTS => Self::Payment(Payment::decode(bytes)?),
            PROCESSION_ASSIGNMENTS => Self::ProcessionAssignment(ProcessionAssignment::decode(bytes)?),
            other => return Err(ProtocolError::UnknownTable(other.to_string())),
        })
    }

    /// Table of this payload.
    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            Self::Person(_) => Person::TABLE,
            Self::PriceList(_) => PriceList::TABLE,
            Self::Receipt(_) => Receipt::TABLE,
            Self::Payment(_) => Payment::TABLE,
            Self::ProcessionAssignment(_) => ProcessionAssignment::TABLE,
        }
    }

    /// Records this payload references.
    #[must_use]
    pub fn references(&self) -> Vec<(&'static str, RecordId)> {
        match self {
            Self::Person(p) => p.references(),
            Self::PriceList(p) => p.references(),
            Self::Receipt(p) => p.references(),
            Self::Payment(p) => p.references(),
            Self::ProcessionAssignment(p) => p.references(),
        }
    }

    /// Encodes back to payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an encode error if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::Person(p) => p.encode(),
            Self::PriceList(p) => p.encode(),
            Self::Receipt(p) => p.encode(),
            Self::Payment(p) => p.encode(),
            Self::ProcessionAssignment(p) => p.encode(),
        }
    }
}

/// The standard tables with their references, referenced tables first.
///
/// # Errors
///
/// Never fails for the built-in names; the `Result` comes from name
/// validation.
pub fn standard_tables() -> ProtocolResult<Vec<TableSpec>> {
    let people = TableName::new(PEOPLE)?;
    let price_lists = TableName::new(PRICE_LISTS)?;
    let receipts = TableName::new(RECEIPTS)?;
    Ok(vec![
        TableSpec::new(people.clone()),
        TableSpec::new(price_lists.clone()),
        TableSpec::new(receipts.clone())
            .depends_on(people.clone())
            .depends_on(price_lists),
        TableSpec::new(TableName::new(PAYMENTS)?)
            .depends_on(receipts)
            .depends_on(people.clone()),
        TableSpec::new(TableName::new(PROCESSION_ASSIGNMENTS)?).depends_on(people),
    ])
}
