//! SQLite store running the five TPC-C transactions against a loaded schema.

use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{Connector, Session};
use crate::config::StoreConfig;
use crate::error::{TpccError, TpccResult};
use crate::kind::TransactionKind;
use crate::params::{
    CustomerSelector, DeliveryParams, NewOrderParams, OrderStatusParams, PaymentParams,
    StockLevelParams, DISTRICTS_PER_WAREHOUSE,
};

mod sql {
    pub const NO_CUSTOMER_WAREHOUSE: &str = "SELECT c_discount, c_last, c_credit, w_tax FROM customer, warehouse WHERE w_id = ? AND c_w_id = w_id AND c_d_id = ? AND c_id = ?";
    pub const NO_DISTRICT: &str = "SELECT d_next_o_id, d_tax FROM district WHERE d_id = ? AND d_w_id = ?";
    pub const NO_DISTRICT_ADVANCE: &str = "UPDATE district SET d_next_o_id = ? + 1 WHERE d_id = ? AND d_w_id = ?";
    pub const NO_ORDER_INSERT: &str = "INSERT INTO orders (o_id, o_d_id, o_w_id, o_c_id, o_entry_d, o_ol_cnt, o_all_local) VALUES (?, ?, ?, ?, ?, ?, ?)";
    pub const NO_NEW_ORDER_INSERT: &str = "INSERT INTO new_orders (no_o_id, no_d_id, no_w_id) VALUES (?, ?, ?)";
    pub const NO_ITEM: &str = "SELECT i_price, i_name, i_data FROM item WHERE i_id = ?";
    pub const NO_STOCK: &str = "SELECT s_quantity, s_data, s_dist_01, s_dist_02, s_dist_03, s_dist_04, s_dist_05, s_dist_06, s_dist_07, s_dist_08, s_dist_09, s_dist_10 FROM stock WHERE s_i_id = ? AND s_w_id = ?";
    pub const NO_STOCK_UPDATE: &str = "UPDATE stock SET s_quantity = ? WHERE s_i_id = ? AND s_w_id = ?";
    pub const NO_LINE_INSERT: &str = "INSERT INTO order_line (ol_o_id, ol_d_id, ol_w_id, ol_number, ol_i_id, ol_supply_w_id, ol_quantity, ol_amount, ol_dist_info) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const PAY_WAREHOUSE_YTD: &str = "UPDATE warehouse SET w_ytd = w_ytd + ? WHERE w_id = ?";
    pub const PAY_WAREHOUSE: &str = "SELECT w_street_1, w_street_2, w_city, w_state, w_zip, w_name FROM warehouse WHERE w_id = ?";
    pub const PAY_DISTRICT_YTD: &str = "UPDATE district SET d_ytd = d_ytd + ? WHERE d_w_id = ? AND d_id = ?";
    pub const PAY_DISTRICT: &str = "SELECT d_street_1, d_street_2, d_city, d_state, d_zip, d_name FROM district WHERE d_w_id = ? AND d_id = ?";
    pub const CUSTOMER_IDS_BY_NAME: &str = "SELECT c_id FROM customer WHERE c_w_id = ? AND c_d_id = ? AND c_last = ? ORDER BY c_first";
    pub const PAY_CUSTOMER: &str = "SELECT c_first, c_middle, c_last, c_street_1, c_street_2, c_city, c_state, c_zip, c_phone, c_credit, c_credit_lim, c_discount, c_balance, c_since FROM customer WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?";
    pub const PAY_CUSTOMER_DATA: &str = "SELECT c_data FROM customer WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?";
    pub const PAY_CUSTOMER_BAD_CREDIT: &str = "UPDATE customer SET c_balance = ?, c_data = ? WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?";
    pub const PAY_CUSTOMER_BALANCE: &str = "UPDATE customer SET c_balance = ? WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?";
    pub const PAY_HISTORY_INSERT: &str = "INSERT INTO history (h_c_d_id, h_c_w_id, h_c_id, h_d_id, h_w_id, h_date, h_amount, h_data) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

    pub const OS_CUSTOMER: &str = "SELECT c_balance, c_first, c_middle, c_last FROM customer WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?";
    pub const OS_LAST_ORDER: &str = "SELECT o_id, o_entry_d, COALESCE(o_carrier_id, 0) FROM orders WHERE o_w_id = ? AND o_d_id = ? AND o_c_id = ? AND o_id = (SELECT MAX(o_id) FROM orders WHERE o_w_id = ? AND o_d_id = ? AND o_c_id = ?)";
    pub const OS_LINES: &str = "SELECT ol_i_id, ol_supply_w_id, ol_quantity, ol_amount, ol_delivery_d FROM order_line WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id = ?";

    pub const DL_OLDEST_NEW_ORDER: &str = "SELECT COALESCE(MIN(no_o_id), 0) FROM new_orders WHERE no_d_id = ? AND no_w_id = ?";
    pub const DL_NEW_ORDER_DELETE: &str = "DELETE FROM new_orders WHERE no_o_id = ? AND no_d_id = ? AND no_w_id = ?";
    pub const DL_ORDER_CUSTOMER: &str = "SELECT o_c_id FROM orders WHERE o_id = ? AND o_d_id = ? AND o_w_id = ?";
    pub const DL_ORDER_CARRIER: &str = "UPDATE orders SET o_carrier_id = ? WHERE o_id = ? AND o_d_id = ? AND o_w_id = ?";
    pub const DL_LINES_DELIVERED: &str = "UPDATE order_line SET ol_delivery_d = ? WHERE ol_o_id = ? AND ol_d_id = ? AND ol_w_id = ?";
    pub const DL_LINES_AMOUNT: &str = "SELECT SUM(ol_amount) FROM order_line WHERE ol_o_id = ? AND ol_d_id = ? AND ol_w_id = ?";
    pub const DL_CUSTOMER_CREDIT: &str = "UPDATE customer SET c_balance = c_balance + ?, c_delivery_cnt = c_delivery_cnt + 1 WHERE c_id = ? AND c_d_id = ? AND c_w_id = ?";

    pub const SL_NEXT_ORDER: &str = "SELECT d_next_o_id FROM district WHERE d_id = ? AND d_w_id = ?";
    pub const SL_RECENT_ITEMS: &str = "SELECT DISTINCT ol_i_id FROM order_line WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id < ? AND ol_o_id >= (? - 20)";
    pub const SL_LOW_STOCK: &str = "SELECT count(*) FROM stock WHERE s_w_id = ? AND s_i_id = ? AND s_quantity < ?";

    pub const ALL: &[&str] = &[
        NO_CUSTOMER_WAREHOUSE,
        NO_DISTRICT,
        NO_DISTRICT_ADVANCE,
        NO_ORDER_INSERT,
        NO_NEW_ORDER_INSERT,
        NO_ITEM,
        NO_STOCK,
        NO_STOCK_UPDATE,
        NO_LINE_INSERT,
        PAY_WAREHOUSE_YTD,
        PAY_WAREHOUSE,
        PAY_DISTRICT_YTD,
        PAY_DISTRICT,
        CUSTOMER_IDS_BY_NAME,
        PAY_CUSTOMER,
        PAY_CUSTOMER_DATA,
        PAY_CUSTOMER_BAD_CREDIT,
        PAY_CUSTOMER_BALANCE,
        PAY_HISTORY_INSERT,
        OS_CUSTOMER,
        OS_LAST_ORDER,
        OS_LINES,
        DL_OLDEST_NEW_ORDER,
        DL_NEW_ORDER_DELETE,
        DL_ORDER_CUSTOMER,
        DL_ORDER_CARRIER,
        DL_LINES_DELIVERED,
        DL_LINES_AMOUNT,
        DL_CUSTOMER_CREDIT,
        SL_NEXT_ORDER,
        SL_RECENT_ITEMS,
        SL_LOW_STOCK,
    ];
}

/// Longest `c_data` kept after a bad-credit payment.
const CUSTOMER_DATA_LEN: usize = 500;

/// How a transaction body ended without a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Commit,
    /// Business rollback: undo the work, still a completed transaction.
    Rollback,
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Opens one SQLite connection per worker on a database file that already
/// holds the TPC-C tables.
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
    wal: bool,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(defaults.busy_timeout_ms),
            wal: defaults.wal,
        }
    }

    pub fn from_config(store: &StoreConfig) -> TpccResult<Self> {
        let path = store
            .path
            .clone()
            .ok_or_else(|| TpccError::invalid_config("store.path is required for the sqlite mode"))?;
        Ok(Self {
            path,
            busy_timeout: Duration::from_millis(store.busy_timeout_ms),
            wal: store.wal,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open and prepare the session of `worker`.
    pub fn open(&self, worker: usize) -> TpccResult<SqliteSession> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        if self.wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(worker, journal_mode = %mode, "journal mode set");
        }
        conn.set_prepared_statement_cache_capacity(sql::ALL.len());
        for statement in sql::ALL {
            conn.prepare_cached(statement)?;
        }
        Ok(SqliteSession {
            conn,
            worker,
            in_unit: false,
        })
    }
}

impl Connector for SqliteConnector {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(&self, worker: usize) -> TpccResult<Box<dyn Session>> {
        Ok(Box::new(self.open(worker)?))
    }
}

/// A worker's connection. Each dispatch cycle is one SQLite transaction;
/// every attempt inside it runs under a savepoint.
pub struct SqliteSession {
    conn: Connection,
    worker: usize,
    in_unit: bool,
}

impl SqliteSession {
    fn attempt<F>(&mut self, kind: TransactionKind, body: F) -> bool
    where
        F: FnOnce(&Connection) -> rusqlite::Result<Flow>,
    {
        let conn = &self.conn;
        let outcome = conn
            .execute_batch("SAVEPOINT attempt")
            .and_then(|()| body(conn))
            .and_then(|flow| {
                if flow == Flow::Rollback {
                    conn.execute_batch("ROLLBACK TO attempt")?;
                }
                conn.execute_batch("RELEASE attempt")
            });

        match outcome {
            Ok(()) => true,
            Err(err) => {
                debug!(worker = self.worker, kind = %kind, error = %err, "attempt failed");
                self.recover(&err);
                false
            }
        }
    }

    /// Undo a failed attempt. A busy or locked store cannot upgrade the
    /// current read snapshot, so the whole unit restarts instead.
    fn recover(&mut self, err: &rusqlite::Error) {
        let contended = matches!(
            err.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        );
        let result = if contended || self.conn.is_autocommit() {
            let rollback = if self.conn.is_autocommit() {
                Ok(())
            } else {
                self.conn.execute_batch("ROLLBACK")
            };
            rollback.and_then(|()| {
                if self.in_unit {
                    self.conn.execute_batch("BEGIN")
                } else {
                    Ok(())
                }
            })
        } else {
            self.conn
                .execute_batch("ROLLBACK TO attempt; RELEASE attempt")
        };
        if let Err(err) = result {
            warn!(worker = self.worker, error = %err, "could not undo failed attempt");
        }
    }
}

impl Session for SqliteSession {
    fn begin_unit(&mut self) -> TpccResult<()> {
        self.conn.execute_batch("BEGIN")?;
        self.in_unit = true;
        Ok(())
    }

    fn end_unit(&mut self) -> TpccResult<()> {
        self.in_unit = false;
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn new_order(&mut self, params: &NewOrderParams) -> bool {
        self.attempt(TransactionKind::NewOrder, |conn| new_order(conn, params))
    }

    fn payment(&mut self, params: &PaymentParams) -> bool {
        self.attempt(TransactionKind::Payment, |conn| payment(conn, params))
    }

    fn order_status(&mut self, params: &OrderStatusParams) -> bool {
        self.attempt(TransactionKind::OrderStatus, |conn| order_status(conn, params))
    }

    fn delivery(&mut self, params: &DeliveryParams) -> bool {
        self.attempt(TransactionKind::Delivery, |conn| delivery(conn, params))
    }

    fn stock_level(&mut self, params: &StockLevelParams) -> bool {
        self.attempt(TransactionKind::StockLevel, |conn| stock_level(conn, params))
    }
}

/// Customer id for a selector; by name picks the middle row ordered by
/// first name.
fn resolve_customer(
    conn: &Connection,
    warehouse_id: u32,
    district_id: u32,
    selector: &CustomerSelector,
) -> rusqlite::Result<u32> {
    match selector {
        CustomerSelector::ById(id) => Ok(*id),
        CustomerSelector::ByLastName(last) => {
            let mut stmt = conn.prepare_cached(sql::CUSTOMER_IDS_BY_NAME)?;
            let ids = stmt
                .query_map(params![warehouse_id, district_id, last], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<u32>>>()?;
            if ids.is_empty() {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            Ok(ids[(ids.len() - 1) / 2])
        }
    }
}

fn new_order(conn: &Connection, p: &NewOrderParams) -> rusqlite::Result<Flow> {
    let (c_discount, w_tax): (f64, f64) = conn
        .prepare_cached(sql::NO_CUSTOMER_WAREHOUSE)?
        .query_row(params![p.warehouse_id, p.district_id, p.customer_id], |row| {
            Ok((row.get(0)?, row.get(3)?))
        })?;
    let (order_id, d_tax): (i64, f64) = conn
        .prepare_cached(sql::NO_DISTRICT)?
        .query_row(params![p.district_id, p.warehouse_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    conn.prepare_cached(sql::NO_DISTRICT_ADVANCE)?
        .execute(params![order_id, p.district_id, p.warehouse_id])?;

    conn.prepare_cached(sql::NO_ORDER_INSERT)?.execute(params![
        order_id,
        p.district_id,
        p.warehouse_id,
        p.customer_id,
        timestamp(),
        p.lines.len() as i64,
        p.all_local,
    ])?;
    conn.prepare_cached(sql::NO_NEW_ORDER_INSERT)?
        .execute(params![order_id, p.district_id, p.warehouse_id])?;

    for (number, line) in p.lines.iter().enumerate() {
        let price: Option<f64> = conn
            .prepare_cached(sql::NO_ITEM)?
            .query_row(params![line.item_id], |row| row.get(0))
            .optional()?;
        let Some(price) = price else {
            return Ok(Flow::Rollback);
        };

        let dist_column = 1 + p.district_id as usize;
        let (quantity, dist_info): (i64, String) = conn
            .prepare_cached(sql::NO_STOCK)?
            .query_row(params![line.item_id, line.supply_warehouse_id], |row| {
                Ok((row.get(0)?, row.get(dist_column)?))
            })?;
        let ordered = i64::from(line.quantity);
        let remaining = if quantity > ordered + 10 {
            quantity - ordered
        } else {
            quantity - ordered + 91
        };
        conn.prepare_cached(sql::NO_STOCK_UPDATE)?.execute(params![
            remaining,
            line.item_id,
            line.supply_warehouse_id
        ])?;

        let amount = ordered as f64 * price * (1.0 + w_tax + d_tax) * (1.0 - c_discount);
        conn.prepare_cached(sql::NO_LINE_INSERT)?.execute(params![
            order_id,
            p.district_id,
            p.warehouse_id,
            number as i64 + 1,
            line.item_id,
            line.supply_warehouse_id,
            line.quantity,
            amount,
            dist_info,
        ])?;
    }
    Ok(Flow::Commit)
}

fn payment(conn: &Connection, p: &PaymentParams) -> rusqlite::Result<Flow> {
    let amount = f64::from(p.amount);

    conn.prepare_cached(sql::PAY_WAREHOUSE_YTD)?
        .execute(params![amount, p.warehouse_id])?;
    let w_name: String = conn
        .prepare_cached(sql::PAY_WAREHOUSE)?
        .query_row(params![p.warehouse_id], |row| row.get(5))?;
    conn.prepare_cached(sql::PAY_DISTRICT_YTD)?
        .execute(params![amount, p.warehouse_id, p.district_id])?;
    let d_name: String = conn
        .prepare_cached(sql::PAY_DISTRICT)?
        .query_row(params![p.warehouse_id, p.district_id], |row| row.get(5))?;

    let (c_w, c_d) = (p.customer_warehouse_id, p.customer_district_id);
    let c_id = resolve_customer(conn, c_w, c_d, &p.customer)?;
    let (credit, balance): (String, f64) = conn
        .prepare_cached(sql::PAY_CUSTOMER)?
        .query_row(params![c_w, c_d, c_id], |row| Ok((row.get(9)?, row.get(12)?)))?;
    let balance = balance - amount;

    if credit == "BC" {
        let data: String = conn
            .prepare_cached(sql::PAY_CUSTOMER_DATA)?
            .query_row(params![c_w, c_d, c_id], |row| row.get(0))?;
        let data: String = format!(
            "| {} {} {} {} {} {:.2} {}",
            c_id, c_d, c_w, p.district_id, p.warehouse_id, amount, data
        )
        .chars()
        .take(CUSTOMER_DATA_LEN)
        .collect();
        conn.prepare_cached(sql::PAY_CUSTOMER_BAD_CREDIT)?
            .execute(params![balance, data, c_w, c_d, c_id])?;
    } else {
        conn.prepare_cached(sql::PAY_CUSTOMER_BALANCE)?
            .execute(params![balance, c_w, c_d, c_id])?;
    }

    conn.prepare_cached(sql::PAY_HISTORY_INSERT)?.execute(params![
        c_d,
        c_w,
        c_id,
        p.district_id,
        p.warehouse_id,
        timestamp(),
        amount,
        format!("{w_name}    {d_name}"),
    ])?;
    Ok(Flow::Commit)
}

fn order_status(conn: &Connection, p: &OrderStatusParams) -> rusqlite::Result<Flow> {
    let (w, d) = (p.warehouse_id, p.district_id);
    let c_id = resolve_customer(conn, w, d, &p.customer)?;
    let _balance: f64 = conn
        .prepare_cached(sql::OS_CUSTOMER)?
        .query_row(params![w, d, c_id], |row| row.get(0))?;

    let order_id: Option<i64> = conn
        .prepare_cached(sql::OS_LAST_ORDER)?
        .query_row(params![w, d, c_id, w, d, c_id], |row| row.get(0))
        .optional()?;
    if let Some(order_id) = order_id {
        let mut lines = conn.prepare_cached(sql::OS_LINES)?;
        let mut rows = lines.query(params![w, d, order_id])?;
        while rows.next()?.is_some() {}
    }
    Ok(Flow::Commit)
}

fn delivery(conn: &Connection, p: &DeliveryParams) -> rusqlite::Result<Flow> {
    let w = p.warehouse_id;
    let delivered_at = timestamp();

    for d in 1..=DISTRICTS_PER_WAREHOUSE {
        let order_id: i64 = conn
            .prepare_cached(sql::DL_OLDEST_NEW_ORDER)?
            .query_row(params![d, w], |row| row.get(0))?;
        if order_id == 0 {
            continue;
        }

        conn.prepare_cached(sql::DL_NEW_ORDER_DELETE)?
            .execute(params![order_id, d, w])?;
        let c_id: i64 = conn
            .prepare_cached(sql::DL_ORDER_CUSTOMER)?
            .query_row(params![order_id, d, w], |row| row.get(0))?;
        conn.prepare_cached(sql::DL_ORDER_CARRIER)?
            .execute(params![p.carrier_id, order_id, d, w])?;
        conn.prepare_cached(sql::DL_LINES_DELIVERED)?
            .execute(params![delivered_at, order_id, d, w])?;
        let total: Option<f64> = conn
            .prepare_cached(sql::DL_LINES_AMOUNT)?
            .query_row(params![order_id, d, w], |row| row.get(0))?;
        conn.prepare_cached(sql::DL_CUSTOMER_CREDIT)?
            .execute(params![total.unwrap_or(0.0), c_id, d, w])?;
    }
    Ok(Flow::Commit)
}

fn stock_level(conn: &Connection, p: &StockLevelParams) -> rusqlite::Result<Flow> {
    let (w, d) = (p.warehouse_id, p.district_id);
    let next_order: i64 = conn
        .prepare_cached(sql::SL_NEXT_ORDER)?
        .query_row(params![d, w], |row| row.get(0))?;

    let items = conn
        .prepare_cached(sql::SL_RECENT_ITEMS)?
        .query_map(
            params![w, d, next_order, next_order],
            |row| row.get::<_, i64>(0),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut low_stock = 0i64;
    let mut count = conn.prepare_cached(sql::SL_LOW_STOCK)?;
    for item in items {
        let n: i64 = count.query_row(params![w, item, p.threshold], |row| row.get(0))?;
        low_stock += n;
    }
    debug!(warehouse = w, district = d, low_stock, "stock level");
    Ok(Flow::Commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::OrderLineInput;
    use crate::random::lastname;
    use tempfile::TempDir;

    const SCHEMA: &str = "
        CREATE TABLE warehouse (w_id INTEGER, w_name TEXT, w_street_1 TEXT, w_street_2 TEXT,
            w_city TEXT, w_state TEXT, w_zip TEXT, w_tax REAL, w_ytd REAL);
        CREATE TABLE district (d_id INTEGER, d_w_id INTEGER, d_name TEXT, d_street_1 TEXT,
            d_street_2 TEXT, d_city TEXT, d_state TEXT, d_zip TEXT, d_tax REAL, d_ytd REAL,
            d_next_o_id INTEGER);
        CREATE TABLE customer (c_id INTEGER, c_d_id INTEGER, c_w_id INTEGER, c_first TEXT,
            c_middle TEXT, c_last TEXT, c_street_1 TEXT, c_street_2 TEXT, c_city TEXT,
            c_state TEXT, c_zip TEXT, c_phone TEXT, c_since TEXT, c_credit TEXT,
            c_credit_lim REAL, c_discount REAL, c_balance REAL, c_delivery_cnt INTEGER,
            c_data TEXT);
        CREATE TABLE history (h_c_id INTEGER, h_c_d_id INTEGER, h_c_w_id INTEGER,
            h_d_id INTEGER, h_w_id INTEGER, h_date TEXT, h_amount REAL, h_data TEXT);
        CREATE TABLE new_orders (no_o_id INTEGER, no_d_id INTEGER, no_w_id INTEGER);
        CREATE TABLE orders (o_id INTEGER, o_d_id INTEGER, o_w_id INTEGER, o_c_id INTEGER,
            o_entry_d TEXT, o_carrier_id INTEGER, o_ol_cnt INTEGER, o_all_local INTEGER);
        CREATE TABLE order_line (ol_o_id INTEGER, ol_d_id INTEGER, ol_w_id INTEGER,
            ol_number INTEGER, ol_i_id INTEGER, ol_supply_w_id INTEGER, ol_delivery_d TEXT,
            ol_quantity INTEGER, ol_amount REAL, ol_dist_info TEXT);
        CREATE TABLE item (i_id INTEGER, i_im_id INTEGER, i_name TEXT, i_price REAL,
            i_data TEXT);
        CREATE TABLE stock (s_i_id INTEGER, s_w_id INTEGER, s_quantity INTEGER,
            s_dist_01 TEXT, s_dist_02 TEXT, s_dist_03 TEXT, s_dist_04 TEXT, s_dist_05 TEXT,
            s_dist_06 TEXT, s_dist_07 TEXT, s_dist_08 TEXT, s_dist_09 TEXT, s_dist_10 TEXT,
            s_data TEXT);
    ";

    /// One warehouse, ten districts, three customers and one undelivered
    /// order in district 1, ten items in stock.
    fn fixture() -> (TempDir, SqliteConnector) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tpcc.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO warehouse VALUES (1, 'W1', 's1', 's2', 'city', 'ST', '12345', 0.1, 0)",
            [],
        )
        .unwrap();
        for d in 1..=10 {
            conn.execute(
                "INSERT INTO district VALUES (?, 1, ?, 's1', 's2', 'city', 'ST', '12345', 0.05, 0, 2)",
                params![d, format!("D{d}")],
            )
            .unwrap();
        }
        let bar = lastname(0);
        for (id, first, last, credit) in [
            (1, "Bob", bar.as_str(), "GC"),
            (2, "Ann", bar.as_str(), "BC"),
            (3, "Cid", "OUGHTOUGHTOUGHT", "GC"),
        ] {
            conn.execute(
                "INSERT INTO customer VALUES (?, 1, 1, ?, 'OE', ?, 's1', 's2', 'city', 'ST',
                 '12345', '555', '2024-01-01', ?, 50000, 0.1, -10, 0, 'history')",
                params![id, first, last, credit],
            )
            .unwrap();
        }
        for i in 1..=10 {
            conn.execute(
                "INSERT INTO item VALUES (?, 1, ?, 2.5, 'data')",
                params![i, format!("item{i}")],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO stock VALUES (?, 1, 50, 'd01', 'd02', 'd03', 'd04', 'd05',
                 'd06', 'd07', 'd08', 'd09', 'd10', 'sdata')",
                params![i],
            )
            .unwrap();
        }
        conn.execute_batch(
            "INSERT INTO orders VALUES (1, 1, 1, 3, '2024-01-01', NULL, 2, 1);
             INSERT INTO new_orders VALUES (1, 1, 1);
             INSERT INTO order_line VALUES (1, 1, 1, 1, 4, 1, NULL, 3, 7.5, 'd01');
             INSERT INTO order_line VALUES (1, 1, 1, 2, 5, 1, NULL, 1, 2.5, 'd01');",
        )
        .unwrap();
        drop(conn);

        let connector = SqliteConnector::new(path);
        (dir, connector)
    }

    fn scalar<T: rusqlite::types::FromSql>(connector: &SqliteConnector, sql: &str) -> T {
        Connection::open(connector.path())
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    fn order(items: &[u32]) -> NewOrderParams {
        NewOrderParams {
            warehouse_id: 1,
            district_id: 1,
            customer_id: 1,
            lines: items
                .iter()
                .map(|&item_id| OrderLineInput {
                    item_id,
                    supply_warehouse_id: 1,
                    quantity: 5,
                })
                .collect(),
            all_local: true,
        }
    }

    #[test]
    fn test_new_order_commits_order_and_lines() {
        let (_dir, connector) = fixture();
        let mut session = connector.open(0).unwrap();

        session.begin_unit().unwrap();
        assert!(session.new_order(&order(&[1, 2, 3])));
        session.end_unit().unwrap();

        assert_eq!(scalar::<i64>(&connector, "SELECT d_next_o_id FROM district WHERE d_id = 1"), 3);
        assert_eq!(scalar::<i64>(&connector, "SELECT count(*) FROM order_line WHERE ol_o_id = 2"), 3);
        assert_eq!(scalar::<i64>(&connector, "SELECT count(*) FROM new_orders"), 2);
        assert_eq!(scalar::<i64>(&connector, "SELECT s_quantity FROM stock WHERE s_i_id = 2"), 45);
        assert_eq!(
            scalar::<String>(&connector, "SELECT ol_dist_info FROM order_line WHERE ol_o_id = 2 AND ol_number = 1"),
            "d01"
        );
    }

    #[test]
    fn test_new_order_unused_item_rolls_back_but_completes() {
        let (_dir, connector) = fixture();
        let mut session = connector.open(0).unwrap();

        session.begin_unit().unwrap();
        assert!(session.new_order(&order(&[1, crate::params::UNUSED_ITEM_ID])));
        session.end_unit().unwrap();

        assert_eq!(scalar::<i64>(&connector, "SELECT d_next_o_id FROM district WHERE d_id = 1"), 2);
        assert_eq!(scalar::<i64>(&connector, "SELECT count(*) FROM orders"), 1);
        assert_eq!(scalar::<i64>(&connector, "SELECT s_quantity FROM stock WHERE s_i_id = 1"), 50);
    }

    #[test]
    fn test_payment_by_name_picks_middle_customer() {
        let (_dir, connector) = fixture();
        let mut session = connector.open(0).unwrap();
        let params = PaymentParams {
            warehouse_id: 1,
            district_id: 1,
            customer_warehouse_id: 1,
            customer_district_id: 1,
            customer: CustomerSelector::ByLastName(lastname(0)),
            amount: 100,
        };

        session.begin_unit().unwrap();
        assert!(session.payment(&params));
        session.end_unit().unwrap();

        // Ann sorts before Bob, so Ann (id 2, bad credit) is charged
        assert_eq!(scalar::<f64>(&connector, "SELECT c_balance FROM customer WHERE c_id = 2"), -110.0);
        assert_eq!(scalar::<f64>(&connector, "SELECT c_balance FROM customer WHERE c_id = 1"), -10.0);
        assert!(scalar::<String>(&connector, "SELECT c_data FROM customer WHERE c_id = 2")
            .starts_with("| 2 1 1 1 1 100.00 history"));
        assert_eq!(scalar::<f64>(&connector, "SELECT w_ytd FROM warehouse"), 100.0);
        assert_eq!(scalar::<String>(&connector, "SELECT h_data FROM history"), "W1    D1");
    }

    #[test]
    fn test_order_status_and_stock_level_are_read_only() {
        let (_dir, connector) = fixture();
        let mut session = connector.open(0).unwrap();

        session.begin_unit().unwrap();
        assert!(session.order_status(&OrderStatusParams {
            warehouse_id: 1,
            district_id: 1,
            customer: CustomerSelector::ById(3),
        }));
        assert!(session.order_status(&OrderStatusParams {
            warehouse_id: 1,
            district_id: 1,
            customer: CustomerSelector::ByLastName("OUGHTOUGHTOUGHT".into()),
        }));
        assert!(session.stock_level(&StockLevelParams {
            warehouse_id: 1,
            district_id: 1,
            threshold: 15,
        }));
        session.end_unit().unwrap();

        assert_eq!(scalar::<i64>(&connector, "SELECT count(*) FROM new_orders"), 1);
    }

    #[test]
    fn test_delivery_delivers_oldest_order() {
        let (_dir, connector) = fixture();
        let mut session = connector.open(0).unwrap();

        session.begin_unit().unwrap();
        assert!(session.delivery(&DeliveryParams {
            warehouse_id: 1,
            carrier_id: 7,
        }));
        session.end_unit().unwrap();

        assert_eq!(scalar::<i64>(&connector, "SELECT count(*) FROM new_orders"), 0);
        assert_eq!(scalar::<i64>(&connector, "SELECT o_carrier_id FROM orders WHERE o_id = 1"), 7);
        assert_eq!(scalar::<f64>(&connector, "SELECT c_balance FROM customer WHERE c_id = 3"), 0.0);
        assert_eq!(scalar::<i64>(&connector, "SELECT c_delivery_cnt FROM customer WHERE c_id = 3"), 1);
    }

    #[test]
    fn test_failed_attempt_keeps_unit_usable() {
        let (_dir, connector) = fixture();
        let mut session = connector.open(0).unwrap();

        session.begin_unit().unwrap();
        let mut missing = order(&[1]);
        missing.customer_id = 999;
        assert!(!session.new_order(&missing));
        assert!(!session.payment(&PaymentParams {
            warehouse_id: 1,
            district_id: 1,
            customer_warehouse_id: 1,
            customer_district_id: 1,
            customer: CustomerSelector::ByLastName("NOBODY".into()),
            amount: 1,
        }));
        assert!(session.new_order(&order(&[1])));
        session.end_unit().unwrap();

        // the failed attempts left nothing behind, the retry did
        assert_eq!(scalar::<f64>(&connector, "SELECT w_ytd FROM warehouse"), 0.0);
        assert_eq!(scalar::<i64>(&connector, "SELECT count(*) FROM orders"), 2);
    }

    #[test]
    fn test_missing_database_fails_connect() {
        let dir = TempDir::new().unwrap();
        let connector = SqliteConnector::new(dir.path().join("absent.db"));
        assert!(connector.connect(0).is_err());
    }

    #[test]
    fn test_from_config_requires_path() {
        assert!(SqliteConnector::from_config(&StoreConfig::default()).is_err());
    }
}
