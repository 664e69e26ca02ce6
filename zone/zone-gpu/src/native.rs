//! C ABI boundary to the native scene library.
//!
//! The library builds an acceleration structure over every zone's
//! triangles once and answers batched containment queries against it. It is
//! loaded at run time from a plugin directory, so machines without it simply
//! fail the probe.
//!
//! ```text
//! i32  zs_create_scene(const GpuTriangle*, u32 triangle_count,
//!                      const NativeZoneRange*, u32 zone_count, u32 leaf_size,
//!                      void** out_handle, char* err, u32 err_len);
//! i32  zs_test_points(void* handle, const GpuPoint*, const u32* zone_ids,
//!                     u32 count, u32 two_rays, u32 seed, u32* out_flags,
//!                     char* err, u32 err_len);
//! void zs_destroy_scene(void* handle);
//! ```
//!
//! Status `0` is success. Any other status is reported as
//! [`GpuError::Native`] carrying the NUL-terminated error text.
//!
//! This is the only module in the workspace that contains `unsafe` code.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use libloading::Library;
use tracing::{debug, info};

use crate::buffers::{GpuPoint, GpuTriangle};
use crate::error::{GpuError, GpuResult};

/// Library stem; the platform prefix and suffix are added by
/// [`libloading::library_filename`].
pub const LIBRARY_STEM: &str = "zonescene";

/// Size of the error text buffer handed to every call.
const ERROR_BUFFER_LEN: usize = 1024;

/// Zone range as the native library expects it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct NativeZoneRange {
    /// Index of the zone's first triangle.
    pub start: u32,
    /// Number of triangles in the zone.
    pub count: u32,
}

/// Something that can build a [`ContainmentScene`] over packed geometry.
///
/// The loaded library implements this through `Arc<NativeLibrary>`.
pub trait SceneBuilder: Send + Sync {
    /// Device identity reported by backends using this builder.
    fn label(&self) -> String;

    /// Build a scene over `triangles`, partitioned by `ranges`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::Native`] when the scene cannot be built.
    fn build(
        &self,
        triangles: &[GpuTriangle],
        ranges: &[NativeZoneRange],
        leaf_size: u32,
    ) -> GpuResult<Box<dyn ContainmentScene>>;
}

/// A built scene answering batched containment queries.
pub trait ContainmentScene: Send {
    /// Number of zones the scene was built with.
    fn zone_count(&self) -> u32;

    /// Test `points` against their zones; returns one raw flag per point.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::Native`] when the query fails.
    fn test_points(
        &mut self,
        points: &[GpuPoint],
        zone_ids: &[u32],
        two_rays: bool,
        seed: u32,
    ) -> GpuResult<Vec<u32>>;
}

type CreateSceneFn = unsafe extern "C" fn(
    *const GpuTriangle,
    u32,
    *const NativeZoneRange,
    u32,
    u32,
    *mut *mut c_void,
    *mut c_char,
    u32,
) -> i32;

type TestPointsFn = unsafe extern "C" fn(
    *mut c_void,
    *const GpuPoint,
    *const u32,
    u32,
    u32,
    u32,
    *mut u32,
    *mut c_char,
    u32,
) -> i32;

type DestroySceneFn = unsafe extern "C" fn(*mut c_void);

/// Full path of the library inside `dir`.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use zone_gpu::native::library_path;
///
/// let path = library_path(Path::new("/opt/zones/plugins"));
/// assert!(path.to_string_lossy().contains("zonescene"));
/// ```
#[must_use]
pub fn library_path(dir: &Path) -> PathBuf {
    dir.join(libloading::library_filename(LIBRARY_STEM))
}

/// A loaded native scene library.
///
/// Function pointers stay valid for as long as the library is loaded, so
/// scenes hold an `Arc` to it.
pub struct NativeLibrary {
    create_scene: CreateSceneFn,
    test_points: TestPointsFn,
    destroy_scene: DestroySceneFn,
    path: PathBuf,
    _library: Library,
}

impl NativeLibrary {
    /// Load the library from `dir` and resolve its three entry points.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NativeLibrary`] when the file cannot be loaded or
    /// lacks one of the symbols.
    pub fn load(dir: &Path) -> GpuResult<Arc<Self>> {
        let path = library_path(dir);
        debug!(path = %path.display(), "Loading native scene library");

        // SAFETY: loading runs the library's initializers. The plugin
        // directory comes from the run configuration.
        let library = unsafe { Library::new(&path) }
            .map_err(|e| GpuError::NativeLibrary(format!("{}: {e}", path.display())))?;

        // SAFETY: the symbol types match the C declarations in the module docs.
        let (create_scene, test_points, destroy_scene) = unsafe {
            (
                *library
                    .get::<CreateSceneFn>(b"zs_create_scene\0")
                    .map_err(missing_symbol)?,
                *library
                    .get::<TestPointsFn>(b"zs_test_points\0")
                    .map_err(missing_symbol)?,
                *library
                    .get::<DestroySceneFn>(b"zs_destroy_scene\0")
                    .map_err(missing_symbol)?,
            )
        };

        info!(path = %path.display(), "Native scene library loaded");
        Ok(Arc::new(Self {
            create_scene,
            test_points,
            destroy_scene,
            path,
            _library: library,
        }))
    }

    /// Path the library was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a scene over `triangles`, partitioned by `ranges`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::BatchTooLarge`] when a count does not fit the ABI,
    /// and [`GpuError::Native`] when the library reports a failure.
    pub fn create_scene(
        self: &Arc<Self>,
        triangles: &[GpuTriangle],
        ranges: &[NativeZoneRange],
        leaf_size: u32,
    ) -> GpuResult<NativeScene> {
        let triangle_count = abi_count("triangle", triangles.len())?;
        let zone_count = abi_count("zone range", ranges.len())?;
        let mut handle: *mut c_void = std::ptr::null_mut();
        let mut err = ErrorBuffer::new();

        // SAFETY: both slices outlive the call and their lengths are passed
        // alongside; the library writes at most `err.len()` bytes of text.
        let status = unsafe {
            (self.create_scene)(
                triangles.as_ptr(),
                triangle_count,
                ranges.as_ptr(),
                zone_count,
                leaf_size,
                &mut handle,
                err.as_mut_ptr(),
                err.len(),
            )
        };
        err.check(status)?;

        let handle = NonNull::new(handle).ok_or_else(|| GpuError::Native {
            status,
            message: "library returned a null scene handle".to_string(),
        })?;
        debug!(triangles = triangle_count, zones = zone_count, leaf_size, "Native scene built");
        Ok(NativeScene {
            handle,
            library: Arc::clone(self),
            zone_count,
        })
    }
}

impl SceneBuilder for Arc<NativeLibrary> {
    fn label(&self) -> String {
        format!("native scene ({})", self.path().display())
    }

    fn build(
        &self,
        triangles: &[GpuTriangle],
        ranges: &[NativeZoneRange],
        leaf_size: u32,
    ) -> GpuResult<Box<dyn ContainmentScene>> {
        Ok(Box::new(self.create_scene(triangles, ranges, leaf_size)?))
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A scene owned by one backend. Destroyed on drop.
pub struct NativeScene {
    handle: NonNull<c_void>,
    library: Arc<NativeLibrary>,
    zone_count: u32,
}

// SAFETY: the handle is owned exclusively by this value and only used
// through `&mut self`; the library allows a scene to move between threads.
unsafe impl Send for NativeScene {}

impl ContainmentScene for NativeScene {
    fn zone_count(&self) -> u32 {
        self.zone_count
    }

    /// Also returns [`GpuError::Execution`] when the two slices differ in
    /// length and [`GpuError::BatchTooLarge`] when the count does not fit
    /// the ABI.
    fn test_points(
        &mut self,
        points: &[GpuPoint],
        zone_ids: &[u32],
        two_rays: bool,
        seed: u32,
    ) -> GpuResult<Vec<u32>> {
        if points.len() != zone_ids.len() {
            return Err(GpuError::Execution(format!(
                "{} points but {} zone ids",
                points.len(),
                zone_ids.len()
            )));
        }
        let count = abi_count("point", points.len())?;
        let mut flags = vec![0u32; points.len()];
        let mut err = ErrorBuffer::new();

        // SAFETY: the handle is live until drop; input slices hold `count`
        // elements and `flags` has room for `count` results.
        let status = unsafe {
            (self.library.test_points)(
                self.handle.as_ptr(),
                points.as_ptr(),
                zone_ids.as_ptr(),
                count,
                u32::from(two_rays),
                seed,
                flags.as_mut_ptr(),
                err.as_mut_ptr(),
                err.len(),
            )
        };
        err.check(status)?;
        Ok(flags)
    }
}

impl Drop for NativeScene {
    fn drop(&mut self) {
        // SAFETY: the handle came from zs_create_scene and is destroyed once.
        unsafe { (self.library.destroy_scene)(self.handle.as_ptr()) };
    }
}

impl std::fmt::Debug for NativeScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeScene")
            .field("zone_count", &self.zone_count)
            .field("library", &self.library.path)
            .finish_non_exhaustive()
    }
}

/// Error text buffer passed to every native call.
struct ErrorBuffer {
    bytes: Vec<u8>,
}

impl ErrorBuffer {
    fn new() -> Self {
        Self {
            bytes: vec![0; ERROR_BUFFER_LEN],
        }
    }

    fn as_mut_ptr(&mut self) -> *mut c_char {
        self.bytes.as_mut_ptr().cast()
    }

    #[allow(clippy::cast_possible_truncation)] // ERROR_BUFFER_LEN fits u32
    fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn message(&self) -> String {
        match CStr::from_bytes_until_nul(&self.bytes) {
            Ok(text) => text.to_string_lossy().into_owned(),
            Err(_) => String::from_utf8_lossy(&self.bytes).into_owned(),
        }
    }

    fn check(&self, status: i32) -> GpuResult<()> {
        if status == 0 {
            return Ok(());
        }
        let mut message = self.message();
        if message.is_empty() {
            message = "no error text".to_string();
        }
        Err(GpuError::Native { status, message })
    }
}

fn abi_count(what: &'static str, len: usize) -> GpuResult<u32> {
    u32::try_from(len).map_err(|_| GpuError::BatchTooLarge {
        what,
        required: len as u64,
        limit: u64::from(u32::MAX),
    })
}

fn missing_symbol(err: libloading::Error) -> GpuError {
    GpuError::NativeLibrary(format!("missing entry point: {err}"))
}
