pub mod execution_provider;
pub mod letterbox;
pub mod onnx_scrfd_detector;
