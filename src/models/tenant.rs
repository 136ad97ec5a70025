//! Tenant model: the configuration envelope for one deployment of the
//! payment service. Single-tenant installs use the `default` row.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Network;
use crate::schema::tenants;

pub const DEFAULT_TENANT_ID: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = tenants)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// SHA-256 hex digest of the tenant API key; the digest alone is
    /// authoritative for authentication.
    pub api_key_hash: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub receiver_address_evm: Option<String>,
    pub receiver_address_tron: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tenants)]
pub struct NewTenant {
    pub id: String,
    pub name: String,
    pub api_key_hash: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub receiver_address_evm: Option<String>,
    pub receiver_address_tron: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Tenant {
    pub fn find_by_id(conn: &mut SqliteConnection, tenant_id: &str) -> Result<Option<Tenant>> {
        use crate::schema::tenants::dsl::*;
        tenants
            .find(tenant_id)
            .first::<Tenant>(conn)
            .optional()
            .context("Failed to load tenant")
    }

    pub fn find_by_api_key_hash(
        conn: &mut SqliteConnection,
        digest: &str,
    ) -> Result<Option<Tenant>> {
        use crate::schema::tenants::dsl::*;
        tenants
            .filter(api_key_hash.eq(digest))
            .filter(is_active.eq(true))
            .first::<Tenant>(conn)
            .optional()
            .context("Failed to look up tenant by API key digest")
    }

    /// Tenant-level receiver address for a network, if configured.
    pub fn receiver_for(&self, network: Network) -> Option<&str> {
        match network {
            Network::Arbitrum | Network::Ethereum => self.receiver_address_evm.as_deref(),
            Network::Tron => self.receiver_address_tron.as_deref(),
        }
    }

    /// Insert the `default` tenant if it does not exist yet, seeding its
    /// receivers and webhook target from process configuration.
    pub fn ensure_default(
        conn: &mut SqliteConnection,
        receiver_evm: Option<String>,
        receiver_tron: Option<String>,
        webhook_url: Option<String>,
        webhook_secret: Option<String>,
    ) -> Result<Tenant> {
        if let Some(existing) = Self::find_by_id(conn, DEFAULT_TENANT_ID)? {
            return Ok(existing);
        }

        let ts = super::now();
        let row = NewTenant {
            id: DEFAULT_TENANT_ID.to_string(),
            name: "Default".to_string(),
            api_key_hash: None,
            webhook_url,
            webhook_secret,
            receiver_address_evm: receiver_evm,
            receiver_address_tron: receiver_tron,
            is_active: true,
            created_at: ts,
            updated_at: ts,
        };

        diesel::insert_into(tenants::table)
            .values(&row)
            .execute(conn)
            .context("Failed to insert default tenant")?;

        Self::find_by_id(conn, DEFAULT_TENANT_ID)?
            .context("default tenant missing immediately after insert")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[test]
    fn ensure_default_is_idempotent() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();

        let first = Tenant::ensure_default(
            &mut conn,
            Some("0xreceiver".into()),
            None,
            Some("https://example.com/hook".into()),
            Some("whsec".into()),
        )
        .unwrap();
        let second = Tenant::ensure_default(&mut conn, None, None, None, None).unwrap();

        assert_eq!(first.id, DEFAULT_TENANT_ID);
        assert_eq!(second.receiver_address_evm.as_deref(), Some("0xreceiver"));
    }

    #[test]
    fn receiver_lookup_by_network() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();
        let tenant = Tenant::ensure_default(
            &mut conn,
            Some("0xevm".into()),
            Some("Ttron".into()),
            None,
            None,
        )
        .unwrap();

        assert_eq!(tenant.receiver_for(Network::Arbitrum), Some("0xevm"));
        assert_eq!(tenant.receiver_for(Network::Ethereum), Some("0xevm"));
        assert_eq!(tenant.receiver_for(Network::Tron), Some("Ttron"));
    }
}
