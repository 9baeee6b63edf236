use crate::error::TpccResult;
use crate::params::{
    DeliveryParams, NewOrderParams, OrderStatusParams, PaymentParams, StockLevelParams,
    TransactionParams,
};

/// One worker's connection to the backing store, with its prepared
/// statements. Lives on the worker thread only.
///
/// Each transaction entry point returns `true` when the transaction
/// committed and `false` when the attempt failed and may be retried. Why it
/// failed is the session's business.
pub trait Session {
    /// Open the unit of work wrapping one dispatch cycle.
    fn begin_unit(&mut self) -> TpccResult<()>;

    /// Close the unit of work, whatever the transaction inside it did.
    fn end_unit(&mut self) -> TpccResult<()>;

    fn new_order(&mut self, params: &NewOrderParams) -> bool;
    fn payment(&mut self, params: &PaymentParams) -> bool;
    fn order_status(&mut self, params: &OrderStatusParams) -> bool;
    fn delivery(&mut self, params: &DeliveryParams) -> bool;
    fn stock_level(&mut self, params: &StockLevelParams) -> bool;

    /// Route `params` to the entry point of its kind.
    fn execute(&mut self, params: &TransactionParams) -> bool {
        match params {
            TransactionParams::NewOrder(p) => self.new_order(p),
            TransactionParams::Payment(p) => self.payment(p),
            TransactionParams::OrderStatus(p) => self.order_status(p),
            TransactionParams::Delivery(p) => self.delivery(p),
            TransactionParams::StockLevel(p) => self.stock_level(p),
        }
    }
}

/// Opens sessions for workers.
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Establish and prepare the session of `worker`. Called on the worker's
    /// own thread; an error is fatal to that worker only.
    fn connect(&self, worker: usize) -> TpccResult<Box<dyn Session>>;
}
