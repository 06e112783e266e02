pub mod icm20948;
