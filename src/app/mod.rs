pub mod dispatch;
pub mod topology;
