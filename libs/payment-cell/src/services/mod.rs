pub mod payment;

pub use payment::PaymentService;
