use core::time::Duration;

/// Poll bounds and optional init steps of [`Bus`](crate::bus::sdmmc::Bus).
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Deadline for the command path to report sent/response/timeout/CRC
    pub command_timeout: Duration,
    /// Deadline for the FIFO to make progress during a block transfer
    pub data_timeout: Duration,
    /// Hardware data timer, in card bus cycles
    pub data_timer: u32,
    /// ACMD41 attempts before power-up is declared timed out
    pub op_cond_attempts: usize,
    pub op_cond_interval_ms: u32,
    /// CMD13 polls while waiting for ready-for-data
    pub status_attempts: usize,
    /// Switch card and host to the 4-line bus after init
    pub wide_bus: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(100),
            data_timeout: Duration::from_millis(250),
            data_timer: 0xFFFF_FFFF,
            op_cond_attempts: 100,
            op_cond_interval_ms: 10,
            status_attempts: 10_000,
            wide_bus: false,
        }
    }
}
