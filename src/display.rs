use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line as Rule, PrimitiveStyle},
    text::{Baseline, Text},
};
use esp_hal::{i2c::master::I2c, Blocking};
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use roomba_core::screens::{DisplayBackend, Line};

use crate::constants::DISPLAY_I2C_ADDRESS;

const ROW_HEIGHT: i32 = 10;
/// First content row, below the header rule
const BODY_TOP: i32 = 13;

type Panel = Ssd1306<
    I2CInterface<I2c<'static, Blocking>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

#[derive(Debug)]
pub enum Error {
    InitFailed,
}

/// 128x64 SSD1306 panel on I2C
pub struct Oled {
    panel: Panel,
}

impl Oled {
    pub fn new(i2c: I2c<'static, Blocking>) -> Result<Self, Error> {
        let interface = I2CDisplayInterface::new_custom_address(i2c, DISPLAY_I2C_ADDRESS);
        let mut panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        panel.init().map_err(|e| {
            log::error!("Display init failed: {:?}", e);
            Error::InitFailed
        })?;
        panel.clear_buffer();
        let _ = panel.flush();
        Ok(Self { panel })
    }
}

impl DisplayBackend for Oled {
    fn set_power_save(&mut self, enabled: bool) {
        if let Err(e) = self.panel.set_display_on(!enabled) {
            log::warn!("Display power change failed: {:?}", e);
        }
    }

    fn draw(&mut self, header: &str, lines: &[Line]) {
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        self.panel.clear_buffer();

        let _ = Text::with_baseline(header, Point::zero(), style, Baseline::Top).draw(&mut self.panel);
        let _ = Rule::new(Point::new(0, 11), Point::new(127, 11))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut self.panel);

        for (row, line) in lines.iter().enumerate() {
            let y = BODY_TOP + row as i32 * ROW_HEIGHT;
            let _ = Text::with_baseline(line, Point::new(0, y), style, Baseline::Top).draw(&mut self.panel);
        }

        if let Err(e) = self.panel.flush() {
            log::warn!("Display flush failed: {:?}", e);
        }
    }
}
