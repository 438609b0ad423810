//! Challenge nodes

mod qr_scan;

pub use qr_scan::QrScanNode;
