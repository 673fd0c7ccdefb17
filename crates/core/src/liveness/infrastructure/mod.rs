pub mod onnx_liveness_model;
