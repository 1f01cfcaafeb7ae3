use core::future::Future;

/// Marker for values that must be [`Send`] unless the `no-send` feature is enabled.
///
/// Cluster facades backed by single-threaded runtimes hand out `!Send` futures; switching on
/// `no-send` drops the bound everywhere the transaction layer asks for it.
///
/// # Safety
///
/// Blanket-implemented. Do not implement it by hand.
#[cfg(not(feature = "no-send"))]
pub unsafe trait MaybeSend: Send {}

/// Marker for values that must be [`Send`] unless the `no-send` feature is enabled.
///
/// # Safety
///
/// Blanket-implemented. Do not implement it by hand.
#[cfg(feature = "no-send")]
pub unsafe trait MaybeSend {}

#[cfg(not(feature = "no-send"))]
unsafe impl<T: Send + ?Sized> MaybeSend for T {}
#[cfg(feature = "no-send")]
unsafe impl<T: ?Sized> MaybeSend for T {}

/// [`Sync`] counterpart of [`MaybeSend`].
///
/// # Safety
///
/// Blanket-implemented. Do not implement it by hand.
#[cfg(not(feature = "no-send"))]
pub unsafe trait MaybeSync: Sync {}

/// [`Sync`] counterpart of [`MaybeSend`].
///
/// # Safety
///
/// Blanket-implemented. Do not implement it by hand.
#[cfg(feature = "no-send")]
pub unsafe trait MaybeSync {}

#[cfg(not(feature = "no-send"))]
unsafe impl<T: Sync + ?Sized> MaybeSync for T {}
#[cfg(feature = "no-send")]
unsafe impl<T: ?Sized> MaybeSync for T {}

/// A future returned by a cluster facade call.
pub trait MaybeSendFuture: Future + MaybeSend {}

impl<F> MaybeSendFuture for F where F: Future + MaybeSend + ?Sized {}
