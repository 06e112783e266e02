//! Configuration and sampling of the InvenSense ICM-20948 9-axis IMU


pub mod bank;
pub mod driver;
pub mod event;
pub mod info;
pub mod registers;
