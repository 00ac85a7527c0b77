pub mod risk;
pub mod schemas;
pub mod timing;
