use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use esp_hal::{
    gpio::DriveMode,
    ledc::{
        channel::{self, ChannelIFace},
        timer::{self, TimerIFace},
        LSGlobalClkSource, Ledc, LowSpeed,
    },
    peripherals::{GPIO2, LEDC},
    time::Rate,
};

use crate::constants::LED_PWM_FREQUENCY_KHZ;

/// Duty cycle in percent requested by the control loop
pub static LED_LEVEL: Signal<CriticalSectionRawMutex, u8> = Signal::new();

#[embassy_executor::task]
pub async fn led_task(ledc: LEDC<'static>, pin: GPIO2<'static>) {
    let mut ledc = Ledc::new(ledc);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    let mut pwm_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    if let Err(e) = pwm_timer.configure(timer::config::Config {
        duty: timer::config::Duty::Duty5Bit,
        clock_source: timer::LSClockSource::APBClk,
        frequency: Rate::from_khz(LED_PWM_FREQUENCY_KHZ),
    }) {
        log::error!("LED timer setup failed: {:?}", e);
        return;
    }

    let mut channel = ledc.channel(channel::Number::Channel0, pin);
    if let Err(e) = channel.configure(channel::config::Config {
        timer: &pwm_timer,
        duty_pct: 0,
        drive_mode: DriveMode::PushPull,
    }) {
        log::error!("LED channel setup failed: {:?}", e);
        return;
    }

    loop {
        let level = LED_LEVEL.wait().await.min(100);
        if let Err(e) = channel.set_duty(level) {
            log::warn!("LED duty update failed: {:?}", e);
        }
    }
}
