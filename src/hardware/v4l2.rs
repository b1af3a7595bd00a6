//! Minimal V4L2 capability query used as the device's liveness probe.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::fcntl::OFlag;

const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// `struct v4l2_capability` from linux/videodev2.h
#[repr(C)]
#[derive(Debug, Default)]
pub struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

nix::ioctl_read!(vidioc_querycap, b'V', 0, V4l2Capability);

/// What the driver reported about the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityInfo {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub can_capture: bool,
}

impl V4l2Capability {
    fn effective_caps(&self) -> u32 {
        if self.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
            self.device_caps
        } else {
            self.capabilities
        }
    }

    pub fn info(&self) -> CapabilityInfo {
        let caps = self.effective_caps();
        CapabilityInfo {
            driver: c_string(&self.driver),
            card: c_string(&self.card),
            bus_info: c_string(&self.bus_info),
            can_capture: caps & (V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_VIDEO_CAPTURE_MPLANE) != 0,
        }
    }
}

fn c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Issue `VIDIOC_QUERYCAP` on `node`.
///
/// The node is opened non-blocking so a wedged driver cannot stall the probe on open.
pub fn query_capabilities(node: &Path) -> Result<CapabilityInfo, String> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(node)
        .map_err(|e| format!("open failed: {e}"))?;

    let mut caps = V4l2Capability::default();
    // SAFETY: the fd is valid for the lifetime of `file` and `caps` matches the
    // kernel's struct layout.
    unsafe { vidioc_querycap(file.as_raw_fd(), &mut caps) }
        .map_err(|e| format!("VIDIOC_QUERYCAP failed: {e}"))?;

    Ok(caps.info())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_matches_kernel_size() {
        assert_eq!(std::mem::size_of::<V4l2Capability>(), 104);
    }

    #[test]
    fn test_info_prefers_device_caps() {
        let mut caps = V4l2Capability::default();
        caps.driver[..10].copy_from_slice(b"uvcvideo\0\0");
        caps.capabilities = V4L2_CAP_DEVICE_CAPS | V4L2_CAP_VIDEO_CAPTURE;
        caps.device_caps = 0x0080_0000; // metadata only
        let info = caps.info();
        assert_eq!(info.driver, "uvcvideo");
        assert!(!info.can_capture);

        caps.device_caps = V4L2_CAP_VIDEO_CAPTURE;
        assert!(caps.info().can_capture);
    }

    #[test]
    fn test_query_on_regular_file_fails() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        assert!(query_capabilities(temp.path()).is_err());
    }

    #[test]
    fn test_query_on_missing_node_fails() {
        let err = query_capabilities(Path::new("/nonexistent/video99")).unwrap_err();
        assert!(err.starts_with("open failed"));
    }
}
