pub mod backup;
pub mod building;
pub mod calibration;
pub mod climate;
pub mod defrost;
pub mod dispatch;
pub mod economics;
pub mod electric_rate;
pub mod heat_pump;
pub(crate) mod solvers;
pub mod units;
