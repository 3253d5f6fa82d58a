//! D3D11 device used by the capture frame pool

use crate::{CaptureError, CaptureResult};
use windows::{
    core::Interface,
    Graphics::DirectX::Direct3D11::IDirect3DDevice,
    Win32::Graphics::{
        Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL_11_0},
        Direct3D11::{
            D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_SDK_VERSION,
        },
        Dxgi::IDXGIDevice,
    },
    Win32::System::WinRT::Direct3D11::{
        CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
    },
};

/// Hardware device plus its WinRT wrapper
pub struct D3D11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    d3d_device: IDirect3DDevice,
}

impl D3D11Device {
    pub fn new() -> CaptureResult<Self> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                Some(&[D3D_FEATURE_LEVEL_11_0]),
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )?;
        }

        let device = device.ok_or_else(|| CaptureError::Platform("D3D11 device not created".into()))?;
        let context =
            context.ok_or_else(|| CaptureError::Platform("D3D11 context not created".into()))?;

        let dxgi_device: IDXGIDevice = device.cast()?;
        let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
        let d3d_device: IDirect3DDevice = inspectable.cast()?;

        Ok(Self {
            device,
            context,
            d3d_device,
        })
    }

    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }

    /// Device handed to the WGC frame pool
    pub fn d3d_device(&self) -> &IDirect3DDevice {
        &self.d3d_device
    }

    /// Unwrap a WinRT surface into its D3D11 interface
    pub fn get_d3d11_interface<T: Interface>(wrapper: &impl Interface) -> CaptureResult<T> {
        let access: IDirect3DDxgiInterfaceAccess = wrapper.cast()?;
        Ok(unsafe { access.GetInterface()? })
    }
}
