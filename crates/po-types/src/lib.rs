//! Shared domain types, ids, and error-free capability contracts used across
//! every crate in the workspace.

pub mod capabilities;
pub mod config;
pub mod domain;
pub mod ids;
pub mod quantity;
pub mod stage;
pub mod workflow;

pub use capabilities::{AIParser, CapabilityError, ImageSearcher, ProgressPublisher, ShopifyClient};
pub use config::Settings;
pub use domain::{
    status_for_confidence, AuditRecord, CreateUpload, JobStatus, Merchant, MerchantStatus,
    NewLineItem, POLineItem, PlaceholderPurchaseOrder, PurchaseOrder, PurchaseOrderStatus,
    PurchaseOrderUpdate, Supplier, Upload, UploadStatus, CONFIDENCE_COMPLETE_THRESHOLD,
};
pub use ids::{LineItemId, MerchantId, PurchaseOrderId, SupplierId, UploadId, WorkflowId};
pub use stage::StageName;
pub use workflow::{WorkflowExecution, WorkflowStatus, WorkflowStatusView};
