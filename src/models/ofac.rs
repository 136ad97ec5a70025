//! OFAC sanctioned-address rows and the ingestion run history.
//!
//! The address set has replace semantics: every ingestion run deletes all
//! rows and inserts the freshly extracted set inside one transaction.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::schema::{ofac_sanctioned_addresses, ofac_update_logs};

pub const OFAC_SOURCE: &str = "OFAC_SDN";

/// Rows are inserted in batches of this size.
pub const INSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = ofac_sanctioned_addresses)]
pub struct OfacSanctionedAddress {
    pub id: String,
    pub address: String,
    pub address_lower: String,
    /// Normalized chain name, e.g. `ethereum`, `tron`.
    pub address_type: String,
    pub sdn_name: String,
    pub sdn_uid: String,
    pub source: String,
    pub last_seen_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ofac_sanctioned_addresses)]
pub struct NewOfacSanctionedAddress {
    pub id: String,
    pub address: String,
    pub address_lower: String,
    pub address_type: String,
    pub sdn_name: String,
    pub sdn_uid: String,
    pub source: String,
    pub last_seen_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = ofac_update_logs)]
pub struct OfacUpdateLog {
    pub id: String,
    pub total_addresses: i32,
    pub added: i32,
    pub removed: i32,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ofac_update_logs)]
pub struct NewOfacUpdateLog {
    pub id: String,
    pub total_addresses: i32,
    pub added: i32,
    pub removed: i32,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
}

impl OfacSanctionedAddress {
    /// Exact-match lookup on the lower-cased address. Cross-chain collisions
    /// return every matching row.
    pub fn find_matches(
        conn: &mut SqliteConnection,
        needle_lower: &str,
    ) -> Result<Vec<OfacSanctionedAddress>> {
        use crate::schema::ofac_sanctioned_addresses::dsl::*;
        ofac_sanctioned_addresses
            .filter(address_lower.eq(needle_lower))
            .load::<OfacSanctionedAddress>(conn)
            .context("Failed to query sanctioned addresses")
    }

    pub fn count_all(conn: &mut SqliteConnection) -> Result<i64> {
        use crate::schema::ofac_sanctioned_addresses::dsl::*;
        ofac_sanctioned_addresses
            .count()
            .get_result(conn)
            .context("Failed to count sanctioned addresses")
    }

    pub fn delete_all(conn: &mut SqliteConnection) -> Result<usize> {
        use crate::schema::ofac_sanctioned_addresses::dsl::*;
        diesel::delete(ofac_sanctioned_addresses)
            .execute(conn)
            .context("Failed to clear sanctioned addresses")
    }

    pub fn insert_batch(
        conn: &mut SqliteConnection,
        rows: &[NewOfacSanctionedAddress],
    ) -> Result<usize> {
        diesel::insert_into(ofac_sanctioned_addresses::table)
            .values(rows)
            .execute(conn)
            .context("Failed to insert sanctioned address batch")
    }

    /// Counts per normalized chain name, for the status endpoint.
    pub fn counts_by_type(conn: &mut SqliteConnection) -> Result<HashMap<String, i64>> {
        use crate::schema::ofac_sanctioned_addresses::dsl::*;
        let rows: Vec<String> = ofac_sanctioned_addresses
            .select(address_type)
            .load(conn)
            .context("Failed to load address types")?;
        let mut counts = HashMap::new();
        for t in rows {
            *counts.entry(t).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

impl OfacUpdateLog {
    pub fn create(conn: &mut SqliteConnection, row: NewOfacUpdateLog) -> Result<()> {
        diesel::insert_into(ofac_update_logs::table)
            .values(&row)
            .execute(conn)
            .context("Failed to insert OFAC update log")?;
        Ok(())
    }

    pub fn latest(conn: &mut SqliteConnection) -> Result<Option<OfacUpdateLog>> {
        use crate::schema::ofac_update_logs::dsl::*;
        ofac_update_logs
            .order(created_at.desc())
            .first::<OfacUpdateLog>(conn)
            .optional()
            .context("Failed to load latest OFAC update log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::now;

    fn row(addr: &str, chain: &str) -> NewOfacSanctionedAddress {
        NewOfacSanctionedAddress {
            id: uuid::Uuid::new_v4().to_string(),
            address: addr.to_string(),
            address_lower: addr.to_lowercase(),
            address_type: chain.to_string(),
            sdn_name: "ACME SDN".to_string(),
            sdn_uid: "12345".to_string(),
            source: OFAC_SOURCE.to_string(),
            last_seen_at: now(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive_via_lowered_column() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();

        OfacSanctionedAddress::insert_batch(
            &mut conn,
            &[row("0xDEadbeef00000000000000000000000000000001", "ethereum")],
        )
        .unwrap();

        let matches = OfacSanctionedAddress::find_matches(
            &mut conn,
            "0xdeadbeef00000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].sdn_name, "ACME SDN");
    }

    #[test]
    fn cross_chain_collision_returns_all_matches() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();

        OfacSanctionedAddress::insert_batch(
            &mut conn,
            &[row("collision", "ethereum"), row("collision", "tron")],
        )
        .unwrap();

        let matches = OfacSanctionedAddress::find_matches(&mut conn, "collision").unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn replace_semantics() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();

        OfacSanctionedAddress::insert_batch(&mut conn, &[row("a", "ethereum")]).unwrap();
        assert_eq!(OfacSanctionedAddress::count_all(&mut conn).unwrap(), 1);

        OfacSanctionedAddress::delete_all(&mut conn).unwrap();
        OfacSanctionedAddress::insert_batch(
            &mut conn,
            &[row("b", "tron"), row("c", "tron")],
        )
        .unwrap();
        assert_eq!(OfacSanctionedAddress::count_all(&mut conn).unwrap(), 2);

        let counts = OfacSanctionedAddress::counts_by_type(&mut conn).unwrap();
        assert_eq!(counts.get("tron"), Some(&2));
        assert_eq!(counts.get("ethereum"), None);
    }
}
