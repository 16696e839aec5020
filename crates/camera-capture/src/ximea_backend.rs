use crate::{CameraDescriptor, CameraSource, DeviceHandle, Error, Frame, PixelFormat, Result};
use image::{ImageBuffer, Rgb};
use std::ffi::CStr;
use time::OffsetDateTime;
use tracing::{debug, info};
use xiapi_sys::XI_IMG_FORMAT::XI_RGB24;

pub const DEFAULT_GRAB_TIMEOUT_MS: u32 = 5000;

const XI_OK: i32 = 0;
const XI_TIMEOUT: i32 = 10;

/// Cameras reachable through the XIMEA xiAPI.
pub struct XimeaCamera {
    exposure_us: Option<u32>,
    timeout_ms: u32,
}

impl XimeaCamera {
    pub fn new() -> Self {
        Self {
            exposure_us: None,
            timeout_ms: DEFAULT_GRAB_TIMEOUT_MS,
        }
    }

    pub fn with_exposure_us(mut self, exposure_us: Option<u32>) -> Self {
        self.exposure_us = exposure_us;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for XimeaCamera {
    fn default() -> Self {
        Self::new()
    }
}

fn xi_error(call: &str, status: i32) -> Error {
    match status {
        XI_TIMEOUT => Error::Device(format!("{call}: timed out waiting for image data")),
        _ => Error::Device(format!("{call} failed with xiAPI status {status}")),
    }
}

fn device_count() -> Result<u32> {
    let mut count: xiapi_sys::DWORD = 0;
    // SAFETY: out-pointer to a live local
    let status = unsafe { xiapi_sys::xiGetNumberDevices(&mut count) };
    if status != XI_OK {
        return Err(xi_error("xiGetNumberDevices", status));
    }
    Ok(count as u32)
}

/// Read one string parameter of an unopened device.
fn device_info(index: u32, param: &[u8]) -> Result<String> {
    let mut buf = [0u8; 256];
    // SAFETY: `param` is one of the NUL-terminated parameter names exported by
    // xiapi_sys and `buf` outlives the call with its length passed alongside
    let status = unsafe {
        xiapi_sys::xiGetDeviceInfoString(
            index as _,
            param.as_ptr().cast(),
            buf.as_mut_ptr().cast(),
            buf.len() as _,
        )
    };
    if status != XI_OK {
        return Err(xi_error("xiGetDeviceInfoString", status));
    }
    let value = CStr::from_bytes_until_nul(&buf)
        .map_err(|_| Error::Device("device info string is not terminated".into()))?;
    Ok(value.to_string_lossy().into_owned())
}

impl CameraSource for XimeaCamera {
    type Device = XimeaDevice;

    fn list(&self) -> Result<Vec<CameraDescriptor>> {
        let count = device_count()?;
        let mut out = Vec::with_capacity(count as usize);
        for idx in 0..count {
            let serial = device_info(idx, xiapi_sys::XI_PRM_DEVICE_SN)?;
            let instance_path = device_info(idx, xiapi_sys::XI_PRM_DEVICE_INSTANCE_PATH)?;
            debug!(idx, %serial, %instance_path, "found camera");
            out.push(CameraDescriptor {
                index: idx as usize,
                serial_number: (!serial.is_empty()).then_some(serial),
                instance_path,
            });
        }
        Ok(out)
    }

    fn open(&self, instance_path: &str) -> Result<XimeaDevice> {
        // xiapi opens by enumeration slot, so resolve the path first
        let cameras = self.list()?;
        let descriptor = CameraDescriptor::find_by_path(&cameras, instance_path).ok_or_else(
            || Error::Device(format!("failed to open camera with instance path: {instance_path}")),
        )?;
        let mut cam = xiapi::open_device(Some(descriptor.index as u32))
            .map_err(|s| xi_error("xiOpenDevice", s))?;
        if let Some(us) = self.exposure_us {
            cam.set_exposure(us as f32)
                .map_err(|s| xi_error("set exposure", s))?;
            debug!(exposure_us = us, "exposure set");
        }
        // RGB24 is packed B,G,R in memory
        cam.set_image_data_format(XI_RGB24)
            .map_err(|s| xi_error("set image data format", s))?;
        let buffer = cam
            .start_acquisition()
            .map_err(|s| xi_error("xiStartAcquisition", s))?;
        info!(%instance_path, "acquisition started");
        Ok(XimeaDevice {
            buffer,
            timeout_ms: self.timeout_ms,
            pixels: Vec::new(),
        })
    }
}

/// An opened camera with acquisition running; stopped and closed on drop.
pub struct XimeaDevice {
    buffer: xiapi::AcquisitionBuffer,
    timeout_ms: u32,
    pixels: Vec<u8>,
}

impl DeviceHandle for XimeaDevice {
    fn grab(&mut self) -> Result<Frame<'_>> {
        let image = self
            .buffer
            .next_image::<u8>(Some(self.timeout_ms))
            .map_err(|s| xi_error("xiGetImage", s))?;
        let packed = ImageBuffer::<Rgb<u8>, _>::from(image);
        let (width, height) = packed.dimensions();
        self.pixels.clear();
        self.pixels.extend_from_slice(&packed);
        Ok(Frame {
            width,
            height,
            pixel_format: PixelFormat::Bgr8,
            data: &self.pixels,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_status_is_a_device_error() {
        let err = xi_error("xiGetImage", XI_TIMEOUT);
        assert_eq!(err.kind(), crate::ErrorKind::Device);
        assert!(err.to_string().contains("timed out"));
        assert!(xi_error("xiOpenDevice", 57).to_string().contains("57"));
    }

    #[test]
    fn test_builder_defaults() {
        let cam = XimeaCamera::new();
        assert_eq!(cam.timeout_ms, DEFAULT_GRAB_TIMEOUT_MS);
        assert!(cam.exposure_us.is_none());
        let cam = cam.with_exposure_us(Some(5000)).with_timeout_ms(250);
        assert_eq!(cam.exposure_us, Some(5000));
        assert_eq!(cam.timeout_ms, 250);
    }
}
