#[cfg(feature = "platform_gecko")]
mod gecko;
