#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use dotcal_image as image;

#[doc(inline)]
pub use dotcal_imgproc as imgproc;

#[doc(inline)]
pub use dotcal_calib as calib;

#[doc(inline)]
pub use dotcal_io as io;
