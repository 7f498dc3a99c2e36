pub mod models;
pub mod repository;
pub mod service;
pub mod store;

pub use models::{AdmitPayment, AssetKind, Payment, PaymentStats, PaymentStatus, ResourceAggregate};
pub use repository::PgPaymentRepository;
pub use service::PaymentService;
pub use store::{AggregateStore, PaymentStore};
