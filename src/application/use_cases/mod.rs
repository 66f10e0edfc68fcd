pub mod cabinet;
pub mod checkout;
pub mod reconciler;
pub mod seats;
pub mod subscription;
