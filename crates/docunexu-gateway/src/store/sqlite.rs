use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    ApiCredential, Balance, BalanceStore, CredentialValidator, StoreError, UsageLog, UsageRecord,
};

/// Prefix of every key issued by [`SqliteStore::issue_key`].
pub const LIVE_KEY_PREFIX: &str = "dn_live_";

/// Subscription plans and the credit ceiling each one grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Hobby,
    Basic,
    Personal,
    Business,
}

impl Plan {
    pub fn credits(self) -> i64 {
        match self {
            Plan::Free | Plan::Hobby => 100,
            Plan::Basic => 17_000,
            Plan::Personal => 37_000,
            Plan::Business => 81_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Hobby => "Hobby",
            Plan::Basic => "Basic",
            Plan::Personal => "Personal",
            Plan::Business => "Business",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "hobby" => Ok(Plan::Hobby),
            "basic" => Ok(Plan::Basic),
            "personal" => Ok(Plan::Personal),
            "business" => Ok(Plan::Business),
            other => Err(StoreError::NotFound(format!("plan '{other}'"))),
        }
    }
}

/// Account profile row
#[derive(Debug, Clone, serde::Serialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub plan: String,
    pub credits: i64,
    pub credit_limit: i64,
    pub created_at: i64,
}

/// API key row
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub user_id: String,
    pub key_name: String,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: i64,
}

/// SQLite-backed account database
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                plan TEXT NOT NULL DEFAULT 'free',
                credits INTEGER NOT NULL DEFAULT 100 CHECK (credits >= 0),
                credit_limit INTEGER NOT NULL DEFAULT 100,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                key_name TEXT NOT NULL,
                api_key TEXT UNIQUE NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);

            CREATE TABLE IF NOT EXISTS usage_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                endpoint TEXT NOT NULL,
                credits_used INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_usage_logs_user_created
                ON usage_logs(user_id, created_at DESC);
            "#,
        )?;

        Ok(())
    }

    /// Create an account on the free plan.
    pub fn create_account(&self, email: &str) -> Result<Account, StoreError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        let id = uuid::Uuid::new_v4().to_string();
        let plan = Plan::Free;

        conn.execute(
            "INSERT INTO profiles (id, email, plan, credits, credit_limit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
            params![id, email, plan.as_str(), plan.credits(), now],
        )?;

        Ok(Account {
            id,
            email: email.to_string(),
            plan: plan.as_str().to_string(),
            credits: plan.credits(),
            credit_limit: plan.credits(),
            created_at: now,
        })
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.lock()?;
        let account = conn
            .query_row(
                "SELECT id, email, plan, credits, credit_limit, created_at
                 FROM profiles WHERE id = ?1",
                params![account_id],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        plan: row.get(2)?,
                        credits: row.get(3)?,
                        credit_limit: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    /// Move an account to a plan, resetting credits and ceiling to the plan's allowance.
    pub fn set_plan(&self, account_id: &str, plan: Plan) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE profiles SET plan = ?1, credits = ?2, credit_limit = ?2 WHERE id = ?3",
            params![plan.as_str(), plan.credits(), account_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("account {account_id}")));
        }
        Ok(())
    }

    /// Overwrite the credit balance. The ceiling is raised if the new balance exceeds it.
    pub fn set_credits(&self, account_id: &str, credits: i64) -> Result<(), StoreError> {
        if credits < 0 {
            return Err(StoreError::Backend(
                "credits must not be negative".to_string(),
            ));
        }
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE profiles
             SET credits = ?1, credit_limit = MAX(credit_limit, ?1)
             WHERE id = ?2",
            params![credits, account_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("account {account_id}")));
        }
        Ok(())
    }

    /// Issue a new live key for an account.
    pub fn issue_key(&self, account_id: &str, key_name: &str) -> Result<ApiKeyRecord, StoreError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        let api_key = format!("{}{}", LIVE_KEY_PREFIX, uuid::Uuid::new_v4().simple());

        let rows = conn.execute(
            "INSERT INTO api_keys (user_id, key_name, api_key, is_active, created_at)
             SELECT id, ?2, ?3, 1, ?4 FROM profiles WHERE id = ?1",
            params![account_id, key_name, api_key, now],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("account {account_id}")));
        }

        Ok(ApiKeyRecord {
            id: conn.last_insert_rowid(),
            user_id: account_id.to_string(),
            key_name: key_name.to_string(),
            api_key,
            is_active: true,
            created_at: now,
        })
    }

    /// Register a caller-chosen key value. Used to import existing keys.
    pub fn insert_key(
        &self,
        account_id: &str,
        key_name: &str,
        api_key: &str,
        is_active: bool,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO api_keys (user_id, key_name, api_key, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![account_id, key_name, api_key, is_active as i32, now],
        )?;
        Ok(())
    }

    /// Deactivate a key. The row is kept so the gateway can answer 403 rather than 401.
    pub fn revoke_key(&self, api_key: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE api_keys SET is_active = 0 WHERE api_key = ?1",
            params![api_key],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("api key".to_string()));
        }
        Ok(())
    }

    pub fn list_keys(&self, account_id: &str) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, key_name, api_key, is_active, created_at
             FROM api_keys WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let keys = stmt
            .query_map(params![account_id], |row| {
                Ok(ApiKeyRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    key_name: row.get(2)?,
                    api_key: row.get(3)?,
                    is_active: row.get::<_, i32>(4)? == 1,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

impl CredentialValidator for SqliteStore {
    async fn validate(&self, token: &str) -> Result<Option<ApiCredential>, StoreError> {
        let conn = self.lock()?;
        let credential = conn
            .query_row(
                "SELECT user_id, is_active FROM api_keys WHERE api_key = ?1",
                params![token],
                |row| {
                    Ok(ApiCredential {
                        account_id: row.get(0)?,
                        is_active: row.get::<_, i32>(1)? == 1,
                    })
                },
            )
            .optional()?;
        Ok(credential)
    }
}

impl BalanceStore for SqliteStore {
    async fn balance(&self, account_id: &str) -> Result<Option<Balance>, StoreError> {
        let conn = self.lock()?;
        let balance = conn
            .query_row(
                "SELECT credits, credit_limit FROM profiles WHERE id = ?1",
                params![account_id],
                |row| {
                    Ok(Balance {
                        credits: row.get(0)?,
                        credit_limit: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(balance)
    }

    async fn decrement(&self, account_id: &str, amount: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        // Single conditional UPDATE: check and subtract happen in one statement.
        let rows = conn.execute(
            "UPDATE profiles SET credits = credits - ?1 WHERE id = ?2 AND credits >= ?1",
            params![amount, account_id],
        )?;
        Ok(rows == 1)
    }
}

impl UsageLog for SqliteStore {
    async fn append(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO usage_logs (user_id, endpoint, credits_used, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.account_id,
                record.endpoint,
                record.credits_used,
                record.created_at
            ],
        )?;
        Ok(())
    }

    async fn recent(&self, account_id: &str, limit: u32) -> Result<Vec<UsageRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, endpoint, credits_used, created_at
             FROM usage_logs WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![account_id, limit], |row| {
                Ok(UsageRecord {
                    account_id: row.get(0)?,
                    endpoint: row.get(1)?,
                    credits_used: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
