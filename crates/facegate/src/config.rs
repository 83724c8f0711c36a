use std::path::PathBuf;

/// Terminal configuration, loaded from `FACEGATE_*` environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX detection model.
    pub model_dir: PathBuf,
    /// Path to the SQLite profile database.
    pub db_path: PathBuf,
    /// Serial port of the door actuator.
    pub serial_port: String,
    /// Serial baud rate.
    pub baud: u32,
    /// Frames discarded at startup for camera AGC/AE stabilization.
    pub warmup_frames: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("profile.db"));

        Self {
            camera_device: std::env::var("FACEGATE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            serial_port: std::env::var("FACEGATE_SERIAL_PORT")
                .unwrap_or_else(|_| "/dev/ttyUSB0".to_string()),
            baud: env_u32("FACEGATE_BAUD", 115_200),
            warmup_frames: env_usize("FACEGATE_WARMUP_FRAMES", 4),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("face_det.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
