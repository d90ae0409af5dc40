//! Capture backend capability and its Windows Graphics Capture (WGC) binding.
//!
//! WGC is a first-party Windows 10 (1903+) API that captures the primary
//! monitor at the GPU driver level. One session is opened per capture request,
//! a single frame is read back to CPU memory, and the session is closed again.
//!
//! On non-Windows platforms [`SystemBackend`] compiles but every session
//! request fails with [`CaptureError::Unavailable`].
use crate::error::CaptureError;

/// A single captured frame as tightly-packed BGRA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major BGRA pixels: width × height × 4 bytes.
    pub bgra_data: Vec<u8>,
}

/// An opaque screen-capture provider.
///
/// Sessions are opened and released by the caller; a session is only ever
/// used from the thread that created it.
pub trait CaptureBackend: Send + Sync + 'static {
    type Session;

    fn create_session(&self) -> Result<Self::Session, CaptureError>;

    /// Blocks until one frame is available or the backend's own wait expires
    /// ([`CaptureError::Transient`]).
    fn grab_frame(&self, session: &mut Self::Session) -> Result<RawFrame, CaptureError>;

    fn release_session(&self, session: Self::Session);
}

/// Releases the wrapped session when dropped, whichever way the capture ends.
pub struct SessionGuard<'a, B: CaptureBackend> {
    backend: &'a B,
    session: Option<B::Session>,
}

impl<'a, B: CaptureBackend> SessionGuard<'a, B> {
    pub fn open(backend: &'a B) -> Result<Self, CaptureError> {
        let session = backend.create_session()?;
        Ok(Self { backend, session: Some(session) })
    }

    pub fn grab_frame(&mut self) -> Result<RawFrame, CaptureError> {
        match self.session.as_mut() {
            Some(session) => self.backend.grab_frame(session),
            None => Err(CaptureError::Disconnected("session already released".into())),
        }
    }
}

impl<B: CaptureBackend> Drop for SessionGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.backend.release_session(session);
        }
    }
}

/// The host platform's capture backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

#[cfg(windows)]
impl CaptureBackend for SystemBackend {
    type Session = imp::WgcSession;

    fn create_session(&self) -> Result<Self::Session, CaptureError> {
        imp::WgcSession::open().map_err(|e| CaptureError::SessionCreation(format!("{e:#}")))
    }

    fn grab_frame(&self, session: &mut Self::Session) -> Result<RawFrame, CaptureError> {
        session.next_frame()
    }

    fn release_session(&self, session: Self::Session) {
        session.close();
    }
}

#[cfg(not(windows))]
impl CaptureBackend for SystemBackend {
    type Session = ();

    fn create_session(&self) -> Result<Self::Session, CaptureError> {
        Err(CaptureError::Unavailable(
            "screen capture (WGC) is only supported on Windows".into(),
        ))
    }

    fn grab_frame(&self, _session: &mut Self::Session) -> Result<RawFrame, CaptureError> {
        Err(CaptureError::Unavailable(
            "screen capture (WGC) is only supported on Windows".into(),
        ))
    }

    fn release_session(&self, _session: Self::Session) {}
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
    use std::time::Duration;

    use anyhow::{Context, Result};
    use tracing::{debug, warn};
    use windows::core::Interface;
    use windows::Foundation::TypedEventHandler;
    use windows::Graphics::Capture::{
        Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureItem,
        GraphicsCaptureSession,
    };
    use windows::Graphics::DirectX::DirectXPixelFormat;
    use windows::Win32::Foundation::POINT;
    use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
    use windows::Win32::Graphics::Direct3D11::{
        D3D11CreateDevice, D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
        D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC,
        D3D11_USAGE_STAGING, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
    };
    use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
    use windows::Win32::Graphics::Dxgi::IDXGIDevice;
    use windows::Win32::Graphics::Gdi::{MonitorFromPoint, MONITOR_DEFAULTTOPRIMARY};
    use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;
    use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

    use super::RawFrame;
    use crate::error::CaptureError;

    /// How long one grab waits for WGC to deliver a frame.
    const FRAME_TIMEOUT: Duration = Duration::from_millis(500);

    pub struct WgcSession {
        device: ID3D11Device,
        context: ID3D11DeviceContext,
        frame_pool: Direct3D11CaptureFramePool,
        session: GraphicsCaptureSession,
        frames: Receiver<Direct3D11CaptureFrame>,
        width: u32,
        height: u32,
    }

    /// Creates a hardware D3D11 device with BGRA surface support.
    fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
        let mut device = None;
        let mut context = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .context("D3D11CreateDevice failed")?;
        }
        let device = device.context("D3D11CreateDevice returned no device")?;
        let context = context.context("D3D11CreateDevice returned no context")?;
        Ok((device, context))
    }

    /// Wraps a D3D11 device into the `IDirect3DDevice` WinRT interface required by WGC.
    fn create_direct3d_device(
        d3d_device: &ID3D11Device,
    ) -> Result<windows::Graphics::DirectX::Direct3D11::IDirect3DDevice> {
        let dxgi_device: IDXGIDevice = d3d_device.cast()?;
        let inspectable = unsafe {
            windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice(
                &dxgi_device,
            )?
        };
        Ok(inspectable.cast()?)
    }

    impl WgcSession {
        /// Starts a WGC session on the primary monitor.
        pub fn open() -> Result<Self> {
            let (device, context) = create_d3d11_device()?;
            let direct3d_device = create_direct3d_device(&device)?;

            let monitor =
                unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) };
            let item: GraphicsCaptureItem = unsafe {
                let interop =
                    windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;
                interop.CreateForMonitor(monitor).context("CreateForMonitor failed")?
            };

            let size = item.Size()?;
            // CreateFreeThreaded: no dispatcher queue / message pump needed.
            let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
                &direct3d_device,
                DirectXPixelFormat::B8G8R8A8UIntNormalized,
                1,
                size,
            )?;
            let session = frame_pool.CreateCaptureSession(&item)?;

            // Bridge the WGC callback to a sync channel the grab can wait on.
            let (tx, frames) = sync_channel::<Direct3D11CaptureFrame>(1);
            frame_pool.FrameArrived(&TypedEventHandler::new(
                move |pool: &Option<Direct3D11CaptureFramePool>, _| {
                    if let Some(pool) = pool {
                        if let Ok(frame) = pool.TryGetNextFrame() {
                            let _ = tx.try_send(frame);
                        }
                    }
                    Ok(())
                },
            ))?;

            // Yellow border toggle needs Windows 11 22H2+; older builds ignore it.
            let _ = session.SetIsBorderRequired(false);
            session.StartCapture()?;
            debug!("WGC session started ({}×{})", size.Width, size.Height);

            Ok(Self {
                device,
                context,
                frame_pool,
                session,
                frames,
                width: size.Width as u32,
                height: size.Height as u32,
            })
        }

        pub fn next_frame(&mut self) -> Result<RawFrame, CaptureError> {
            let frame = match self.frames.recv_timeout(FRAME_TIMEOUT) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CaptureError::Transient(format!(
                        "no frame within {}ms",
                        FRAME_TIMEOUT.as_millis()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::Disconnected("frame pool closed".into()))
                }
            };
            let bgra_data = unsafe { self.readback(&frame) }
                .map_err(|e| CaptureError::Transient(format!("frame readback failed: {e:#}")))?;
            Ok(RawFrame { width: self.width, height: self.height, bgra_data })
        }

        /// Copies a WGC frame's GPU surface into a CPU-side BGRA byte vector,
        /// handling row-pitch padding.
        unsafe fn readback(&self, frame: &Direct3D11CaptureFrame) -> Result<Vec<u8>> {
            let surface = frame.Surface()?;
            let dxgi_access: IDirect3DDxgiInterfaceAccess = surface.cast()?;
            let texture: ID3D11Texture2D = dxgi_access.GetInterface()?;

            let desc = D3D11_TEXTURE2D_DESC {
                Width: self.width,
                Height: self.height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                Usage: D3D11_USAGE_STAGING,
                BindFlags: 0,
                CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
                MiscFlags: 0,
            };
            let mut staging: Option<ID3D11Texture2D> = None;
            self.device
                .CreateTexture2D(&desc, None, Some(&mut staging))
                .context("CreateTexture2D (staging) failed")?;
            let staging = staging.context("CreateTexture2D returned no texture")?;

            self.context.CopyResource(&staging, &texture);

            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.context
                .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .context("ID3D11DeviceContext::Map failed")?;

            let row_pitch = mapped.RowPitch as usize;
            let row_bytes = self.width as usize * 4;
            let mut bgra = Vec::with_capacity(self.height as usize * row_bytes);
            for row in 0..self.height as usize {
                let src = std::slice::from_raw_parts(
                    (mapped.pData as *const u8).add(row * row_pitch),
                    row_bytes,
                );
                bgra.extend_from_slice(src);
            }

            self.context.Unmap(&staging, 0);
            Ok(bgra)
        }

        pub fn close(self) {
            if let Err(e) = self.session.Close() {
                warn!("Failed to close WGC session: {e}");
            }
            if let Err(e) = self.frame_pool.Close() {
                warn!("Failed to close WGC frame pool: {e}");
            }
            debug!("WGC session closed");
        }
    }
}
