use embedded_hal::blocking::delay::DelayMs;

pub trait Delay: DelayMs<u32> {}

impl<T: DelayMs<u32>> Delay for T {}

#[cfg(feature = "std")]
pub mod std {
    pub struct Delay;

    impl embedded_hal::blocking::delay::DelayMs<u32> for Delay {
        fn delay_ms(&mut self, ms: u32) {
            ::std::thread::sleep(::std::time::Duration::from_millis(ms as u64));
        }
    }
}
