pub mod chatdtos;
pub mod eventdtos;
