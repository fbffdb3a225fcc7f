use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::{
    billing::{ContractStatus, DEFAULT_CUTOFF_DAYS},
    error::{ReconcileError, Result},
    storage::models::{
        CandidateFilter, CollectionAction, Contract, MigrationReport, NewContract,
        OverrideReport, StatusAudit, StatusOverride,
    },
};

/// Status left behind by older deployments for clients 63+ days late
pub const LEGACY_DEAD_CLIENT: &str = "Cliente Morto";

/// Status older deployments wrote when the portal lookup failed
pub const LEGACY_LOOKUP_ERROR: &str = "Erro ao consultar";

const CONTRACT_COLUMNS: &str = "id, number, holder_name, due_day, last_check, status, \
     delinquency_days, installment, amount, cancellation_month";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS contracts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number TEXT NOT NULL UNIQUE,
                holder_name TEXT,
                due_day INTEGER,
                last_check TEXT,
                status TEXT NOT NULL,
                delinquency_days INTEGER,
                installment INTEGER,
                amount REAL,
                cancellation_month TEXT
            )",
            [],
        )?;

        // No uniqueness on (contract_id, delinquency_day): the write path checks it
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS collection_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_id INTEGER NOT NULL,
                channel TEXT NOT NULL,
                message TEXT NOT NULL,
                delinquency_day INTEGER NOT NULL,
                installment INTEGER,
                created_at TEXT NOT NULL,
                delivery_status TEXT NOT NULL,
                FOREIGN KEY (contract_id) REFERENCES contracts(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contract_status ON contracts(status)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_action_contract_day
             ON collection_actions(contract_id, delinquency_day)",
            [],
        )?;

        Ok(())
    }

    fn contract_from_row(row: &Row<'_>) -> rusqlite::Result<Contract> {
        Ok(Contract {
            id: row.get(0)?,
            number: row.get(1)?,
            holder_name: row.get(2)?,
            due_day: row.get(3)?,
            last_check: row.get(4)?,
            status: row.get(5)?,
            delinquency_days: row.get(6)?,
            installment: row.get(7)?,
            amount: row.get(8)?,
            cancellation_month: row.get(9)?,
        })
    }

    pub fn add_contract(&self, contract: &NewContract) -> Result<Contract> {
        self.conn.execute(
            "INSERT INTO contracts (number, holder_name, due_day, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                contract.number.trim(),
                contract.holder_name,
                contract.due_day,
                contract.status,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_contract(id)?
            .ok_or_else(|| ReconcileError::NotFound(contract.number.clone()))
    }

    pub fn get_contract(&self, id: i64) -> Result<Option<Contract>> {
        let contract = self
            .conn
            .query_row(
                &format!("SELECT {} FROM contracts WHERE id = ?1", CONTRACT_COLUMNS),
                [id],
                Self::contract_from_row,
            )
            .optional()?;
        Ok(contract)
    }

    pub fn get_contract_by_number(&self, number: &str) -> Result<Option<Contract>> {
        let contract = self
            .conn
            .query_row(
                &format!("SELECT {} FROM contracts WHERE number = ?1", CONTRACT_COLUMNS),
                [number.trim()],
                Self::contract_from_row,
            )
            .optional()?;
        Ok(contract)
    }

    /// Contracts matching a scheduler filter, least recently checked first
    pub fn load_candidates(&self, filter: CandidateFilter) -> Result<Vec<Contract>> {
        let contracts = match filter {
            CandidateFilter::InArrearsNotCheckedOn(day) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM contracts
                     WHERE status = ?1 AND (last_check IS NULL OR last_check <> ?2)
                     ORDER BY last_check ASC, id ASC",
                    CONTRACT_COLUMNS
                ))?;
                let rows = stmt.query_map(
                    params![ContractStatus::InArrears, day],
                    Self::contract_from_row,
                )?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            CandidateFilter::Active => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM contracts
                     WHERE status IN (?1, ?2)
                     ORDER BY last_check ASC, id ASC",
                    CONTRACT_COLUMNS
                ))?;
                let rows = stmt.query_map(
                    params![ContractStatus::Current, ContractStatus::Paid],
                    Self::contract_from_row,
                )?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        debug!("Loaded {} contracts for {:?}", contracts.len(), filter);
        Ok(contracts)
    }

    /// Writes the reconciled fields of one contract in a single statement
    pub fn save_contract(&self, contract: &Contract) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE contracts
             SET status = ?1, delinquency_days = ?2, installment = ?3, amount = ?4,
                 cancellation_month = ?5, last_check = ?6, due_day = ?7, holder_name = ?8
             WHERE id = ?9",
            params![
                contract.status,
                contract.delinquency_days,
                contract.installment,
                contract.amount,
                contract.cancellation_month,
                contract.last_check,
                contract.due_day,
                contract.holder_name,
                contract.id,
            ],
        )?;

        if updated == 0 {
            return Err(ReconcileError::NotFound(contract.number.clone()));
        }
        Ok(())
    }

    /// Creates the collection action for (contract, delinquency day) unless one
    /// already exists. Returns whether a record was created.
    pub fn ensure_collection_action(&self, contract: &Contract, delinquency_day: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM collection_actions
                WHERE contract_id = ?1 AND delinquency_day = ?2
             )",
            params![contract.id, delinquency_day],
            |row| row.get(0),
        )?;

        if exists {
            debug!(
                "Collection action for {} at {} days already recorded",
                contract.number, delinquency_day
            );
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO collection_actions
             (contract_id, channel, message, delinquency_day, installment, created_at, delivery_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                contract.id,
                "SMS",
                format!("Cobrança {} atraso {}d", contract.number, delinquency_day),
                delinquency_day,
                contract.installment,
                Utc::now(),
                "sent",
            ],
        )?;
        tx.commit()?;

        info!(
            "Collection action created for {} at {} days late",
            contract.number, delinquency_day
        );
        Ok(true)
    }

    pub fn collection_actions(&self, contract_id: i64) -> Result<Vec<CollectionAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contract_id, channel, message, delinquency_day, installment,
                    created_at, delivery_status
             FROM collection_actions
             WHERE contract_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let actions = stmt
            .query_map([contract_id], |row| {
                Ok(CollectionAction {
                    id: row.get(0)?,
                    contract_id: row.get(1)?,
                    channel: row.get(2)?,
                    message: row.get(3)?,
                    delinquency_day: row.get(4)?,
                    installment: row.get(5)?,
                    created_at: row.get(6)?,
                    delivery_status: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(actions)
    }

    /// Overwrites the status of each listed contract. No business rule is
    /// checked: this is the manual path for `cancelled_by_rule` and for
    /// bringing cancelled contracts back.
    pub fn apply_status_overrides(&self, rows: &[StatusOverride]) -> Result<OverrideReport> {
        let mut report = OverrideReport::default();

        for row in rows {
            let status = match row.status.parse::<ContractStatus>() {
                Ok(status) => status,
                Err(e) => {
                    report.errors += 1;
                    report.messages.push(format!("Contract {}: {}", row.contract, e));
                    continue;
                }
            };

            let previous: Option<String> = self
                .conn
                .query_row(
                    "SELECT status FROM contracts WHERE number = ?1",
                    [&row.contract],
                    |r| r.get(0),
                )
                .optional()?;

            let Some(previous) = previous else {
                report.not_found += 1;
                report
                    .messages
                    .push(format!("Contract {} not found, skipped", row.contract));
                continue;
            };

            self.conn.execute(
                "UPDATE contracts SET status = ?1 WHERE number = ?2",
                params![status, row.contract],
            )?;
            report.updated += 1;
            report
                .messages
                .push(format!("Contract {}: {} -> {}", row.contract, previous, status));
        }

        info!(
            "Status override finished: {} updated, {} not found, {} with errors",
            report.updated, report.not_found, report.errors
        );
        Ok(report)
    }

    /// Bulk form of the 60-day cutoff. Idempotent.
    pub fn correct_overdue_defaults(&self) -> Result<usize> {
        let affected = correct_overdue(&self.conn)?;
        info!("Cutoff correction moved {} contracts to cancelled_for_default", affected);
        Ok(affected)
    }

    /// Brings a database written by older deployments onto the fixed status set
    pub fn migrate_legacy_statuses(&self) -> Result<MigrationReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = MigrationReport::default();

        for status in ContractStatus::ALL {
            report.relabelled += tx.execute(
                "UPDATE contracts SET status = ?1 WHERE status = ?2",
                params![status, status.label()],
            )?;
        }

        report.dead_clients = tx.execute(
            "UPDATE contracts SET status = ?1 WHERE status = ?2",
            params![ContractStatus::CancelledForDefault, LEGACY_DEAD_CLIENT],
        )?;

        report.lookup_errors_cancelled = tx.execute(
            "UPDATE contracts SET status = ?1 WHERE status = ?2 AND delinquency_days > ?3",
            params![
                ContractStatus::CancelledForDefault,
                LEGACY_LOOKUP_ERROR,
                DEFAULT_CUTOFF_DAYS
            ],
        )?;

        report.lookup_errors_reset = tx.execute(
            "UPDATE contracts SET status = ?1 WHERE status = ?2",
            params![ContractStatus::InArrears, LEGACY_LOOKUP_ERROR],
        )?;

        report.overdue_cancelled = correct_overdue(&tx)?;
        tx.commit()?;

        info!("Legacy status migration complete: {:?}", report);
        Ok(report)
    }

    /// Row counts per stored status value
    pub fn status_audit(&self) -> Result<StatusAudit> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contracts", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM contracts GROUP BY status ORDER BY COUNT(*) DESC, status ASC",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StatusAudit {
            total: total as usize,
            groups,
        })
    }

    /// All contracts, optionally restricted to one status, ordered by number
    pub fn list_contracts(&self, status: Option<ContractStatus>) -> Result<Vec<Contract>> {
        let contracts = match status {
            Some(status) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM contracts WHERE status = ?1 ORDER BY number ASC",
                    CONTRACT_COLUMNS
                ))?;
                let rows = stmt.query_map([status], Self::contract_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM contracts ORDER BY number ASC",
                    CONTRACT_COLUMNS
                ))?;
                let rows = stmt.query_map([], Self::contract_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(contracts)
    }

    /// Date of the most recent check across all contracts
    pub fn last_check_date(&self) -> Result<Option<NaiveDate>> {
        let date = self
            .conn
            .query_row("SELECT MAX(last_check) FROM contracts", [], |row| row.get(0))?;
        Ok(date)
    }
}

fn correct_overdue(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE contracts SET status = ?1 WHERE status = ?2 AND delinquency_days > ?3",
        params![
            ContractStatus::CancelledForDefault,
            ContractStatus::InArrears,
            DEFAULT_CUTOFF_DAYS
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add(db: &Database, number: &str, due_day: Option<u32>, status: ContractStatus) -> Contract {
        db.add_contract(&NewContract {
            number: number.to_string(),
            holder_name: Some(format!("Holder {}", number)),
            due_day,
            status,
        })
        .unwrap()
    }

    fn set_arrears(db: &Database, contract: &Contract, days: i64) -> Contract {
        let mut updated = contract.clone();
        updated.status = ContractStatus::InArrears;
        updated.delinquency_days = Some(days);
        updated.installment = Some(2);
        updated.amount = Some(310.0);
        db.save_contract(&updated).unwrap();
        updated
    }

    #[test]
    fn saves_and_reloads_contract_fields() {
        let db = Database::in_memory().unwrap();
        let mut contract = add(&db, "0012345", Some(30), ContractStatus::Current);
        assert_eq!(contract.last_check, None);

        contract.status = ContractStatus::CancelledForDefault;
        contract.cancellation_month = Some(date(2025, 2, 1));
        contract.last_check = Some(date(2025, 3, 4));
        db.save_contract(&contract).unwrap();

        let reloaded = db.get_contract_by_number("0012345").unwrap().unwrap();
        assert_eq!(reloaded, contract);
        assert!(db.get_contract_by_number("missing").unwrap().is_none());
    }

    #[test]
    fn candidate_filters() {
        let db = Database::in_memory().unwrap();
        let today = date(2025, 3, 10);

        let late = add(&db, "1", Some(5), ContractStatus::Current);
        let mut late = set_arrears(&db, &late, 10);
        let checked_today = add(&db, "2", Some(5), ContractStatus::Current);
        let mut checked_today = set_arrears(&db, &checked_today, 10);
        checked_today.last_check = Some(today);
        db.save_contract(&checked_today).unwrap();
        late.last_check = Some(date(2025, 3, 9));
        db.save_contract(&late).unwrap();

        add(&db, "3", Some(5), ContractStatus::Current);
        add(&db, "4", Some(5), ContractStatus::Paid);
        add(&db, "5", Some(5), ContractStatus::CancelledForDefault);
        add(&db, "6", Some(5), ContractStatus::CancelledByRule);

        let arrears = db
            .load_candidates(CandidateFilter::InArrearsNotCheckedOn(today))
            .unwrap();
        assert_eq!(arrears.iter().map(|c| c.number.as_str()).collect::<Vec<_>>(), ["1"]);

        let active = db.load_candidates(CandidateFilter::Active).unwrap();
        assert_eq!(
            active.iter().map(|c| c.number.as_str()).collect::<Vec<_>>(),
            ["3", "4"]
        );
    }

    #[test]
    fn collection_action_is_created_once_per_delinquency_day() {
        let db = Database::in_memory().unwrap();
        let contract = add(&db, "777", Some(10), ContractStatus::Current);
        let contract = set_arrears(&db, &contract, 12);

        assert!(db.ensure_collection_action(&contract, 12).unwrap());
        assert!(!db.ensure_collection_action(&contract, 12).unwrap());
        assert!(db.ensure_collection_action(&contract, 13).unwrap());

        let actions = db.collection_actions(contract.id).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].delinquency_day, 12);
        assert_eq!(actions[0].channel, "SMS");
        assert_eq!(actions[0].installment, Some(2));
        assert_eq!(actions[0].message, "Cobrança 777 atraso 12d");
    }

    #[test]
    fn cutoff_correction_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let a = add(&db, "10", Some(10), ContractStatus::Current);
        set_arrears(&db, &a, 75);
        let b = add(&db, "11", Some(10), ContractStatus::Current);
        set_arrears(&db, &b, 60);

        assert_eq!(db.correct_overdue_defaults().unwrap(), 1);
        assert_eq!(db.correct_overdue_defaults().unwrap(), 0);

        let a = db.get_contract_by_number("10").unwrap().unwrap();
        assert_eq!(a.status, ContractStatus::CancelledForDefault);
        let b = db.get_contract_by_number("11").unwrap().unwrap();
        assert_eq!(b.status, ContractStatus::InArrears);
    }

    #[test]
    fn overrides_overwrite_status_without_validation() {
        let db = Database::in_memory().unwrap();
        add(&db, "500", Some(10), ContractStatus::CancelledForDefault);
        add(&db, "501", Some(10), ContractStatus::InArrears);

        let rows: Vec<StatusOverride> = serde_json::from_str(
            r#"[
                {"CONTRATO": 500, "STATUS": "Em dia"},
                {"CONTRATO": "501 ", "STATUS": "cancelled_by_rule"},
                {"CONTRATO": "502", "STATUS": "Pago"},
                {"CONTRATO": "500", "STATUS": "Cliente Morto"}
            ]"#,
        )
        .unwrap();

        let report = db.apply_status_overrides(&rows).unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.messages[0], "Contract 500: cancelled_for_default -> current");

        let resurrected = db.get_contract_by_number("500").unwrap().unwrap();
        assert_eq!(resurrected.status, ContractStatus::Current);
        let ruled = db.get_contract_by_number("501").unwrap().unwrap();
        assert_eq!(ruled.status, ContractStatus::CancelledByRule);
    }

    #[test]
    fn legacy_migration_normalizes_statuses() {
        let db = Database::in_memory().unwrap();
        let legacy = [
            ("1", "Em dia", None),
            ("2", "Em atraso", Some(90)),
            ("3", "Cliente Morto", Some(70)),
            ("4", "Erro ao consultar", Some(61)),
            ("5", "Erro ao consultar", Some(20)),
            ("6", "Pago", None),
        ];
        for (number, status, days) in legacy {
            db.conn
                .execute(
                    "INSERT INTO contracts (number, status, delinquency_days) VALUES (?1, ?2, ?3)",
                    params![number, status, days],
                )
                .unwrap();
        }

        let report = db.migrate_legacy_statuses().unwrap();
        assert_eq!(report.relabelled, 3);
        assert_eq!(report.dead_clients, 1);
        assert_eq!(report.lookup_errors_cancelled, 1);
        assert_eq!(report.lookup_errors_reset, 1);
        assert_eq!(report.overdue_cancelled, 1);

        let status = |n: &str| db.get_contract_by_number(n).unwrap().unwrap().status;
        assert_eq!(status("1"), ContractStatus::Current);
        assert_eq!(status("2"), ContractStatus::CancelledForDefault);
        assert_eq!(status("3"), ContractStatus::CancelledForDefault);
        assert_eq!(status("4"), ContractStatus::CancelledForDefault);
        assert_eq!(status("5"), ContractStatus::InArrears);
        assert_eq!(status("6"), ContractStatus::Paid);

        let audit = db.status_audit().unwrap();
        assert_eq!(audit.total, 6);
        assert_eq!(audit.grouped_total(), 6);
        assert_eq!(audit.groups[0], ("cancelled_for_default".to_string(), 3));
    }

    #[test]
    fn lists_contracts_by_status() {
        let db = Database::in_memory().unwrap();
        add(&db, "20", Some(5), ContractStatus::Paid);
        add(&db, "10", Some(5), ContractStatus::Current);
        add(&db, "30", Some(5), ContractStatus::Paid);

        let all = db.list_contracts(None).unwrap();
        assert_eq!(all.iter().map(|c| c.number.as_str()).collect::<Vec<_>>(), ["10", "20", "30"]);

        let paid = db.list_contracts(Some(ContractStatus::Paid)).unwrap();
        assert_eq!(paid.len(), 2);
        assert!(db.list_contracts(Some(ContractStatus::InArrears)).unwrap().is_empty());
    }
}
