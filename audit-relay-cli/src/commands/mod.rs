pub mod check;
pub mod props;
