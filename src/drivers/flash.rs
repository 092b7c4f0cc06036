use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{self, Instance, Spi};
use embassy_time::{Duration, Timer};

const CMD_JEDEC_ID: u8 = 0x9F;
const CMD_READ: u8 = 0x03;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_READ_STATUS: u8 = 0x05;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_SECTOR_ERASE: u8 = 0x20;

const STATUS_BUSY: u8 = 0x01;
const PAGE_SIZE: usize = 256;

/// First 4 KiB sector holds the settings image.
pub const SETTINGS_ADDR: u32 = 0x0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    Spi,
    Timeout,
    /// Image does not fit one page.
    TooLarge,
}

impl From<spi::Error> for FlashError {
    fn from(_: spi::Error) -> Self {
        FlashError::Spi
    }
}

/// W25Qxx SPI NOR flash, used as settings storage.
pub struct W25qxx<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> W25qxx<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    /// Command bytes out, then `rx.len()` bytes in, in one chip-select window.
    fn transaction(&mut self, cmd: &[u8], rx: &mut [u8]) -> Result<(), FlashError> {
        self.cs.set_low();
        let mut res = self.spi.blocking_write(cmd);
        if res.is_ok() && !rx.is_empty() {
            res = self.spi.blocking_read(rx);
        }
        self.cs.set_high();
        Ok(res?)
    }

    fn command_with_addr(cmd: u8, addr: u32) -> [u8; 4] {
        let a = addr.to_be_bytes();
        [cmd, a[1], a[2], a[3]]
    }

    pub fn read_id(&mut self) -> Result<[u8; 3], FlashError> {
        let mut id = [0u8; 3];
        self.transaction(&[CMD_JEDEC_ID], &mut id)?;
        Ok(id)
    }

    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.transaction(&Self::command_with_addr(CMD_READ, addr), buf)
    }

    async fn wait_idle(&mut self, timeout: Duration) -> Result<(), FlashError> {
        let polls = timeout.as_millis().max(1);
        for _ in 0..polls {
            let mut status = [0u8; 1];
            self.transaction(&[CMD_READ_STATUS], &mut status)?;
            if status[0] & STATUS_BUSY == 0 {
                return Ok(());
            }
            Timer::after(Duration::from_millis(1)).await;
        }
        Err(FlashError::Timeout)
    }

    /// Erase the settings sector and program `image` at its start.
    pub async fn store(&mut self, addr: u32, image: &[u8]) -> Result<(), FlashError> {
        if image.len() > PAGE_SIZE {
            return Err(FlashError::TooLarge);
        }

        self.transaction(&[CMD_WRITE_ENABLE], &mut [])?;
        self.transaction(&Self::command_with_addr(CMD_SECTOR_ERASE, addr), &mut [])?;
        // sector erase is typically 45 ms, 400 ms worst case
        self.wait_idle(Duration::from_millis(400)).await?;

        self.transaction(&[CMD_WRITE_ENABLE], &mut [])?;
        self.cs.set_low();
        let mut res = self.spi.blocking_write(&Self::command_with_addr(CMD_PAGE_PROGRAM, addr));
        if res.is_ok() {
            res = self.spi.blocking_write(image);
        }
        self.cs.set_high();
        res?;
        self.wait_idle(Duration::from_millis(5)).await
    }
}
