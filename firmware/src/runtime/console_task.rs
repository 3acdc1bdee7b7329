use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};

use super::{CommandQueue, ReplyQueue};
use crate::console::{
    CONSOLE_LINE_CAPACITY, LineEvent, LineAssembler, ReplyLine, Route, render, route,
};
use crate::logging::{log_command, log_reply};
use crate::status;

const CONSOLE_UART_BUFFER_SIZE: usize = 256;
const GOVERNOR_UART_BAUD: u32 = 115_200;

static mut UART_TX_BUFFER: [u8; CONSOLE_UART_BUFFER_SIZE] = [0; CONSOLE_UART_BUFFER_SIZE];
static mut UART_RX_BUFFER: [u8; CONSOLE_UART_BUFFER_SIZE] = [0; CONSOLE_UART_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::task]
pub async fn run(
    commands: &'static CommandQueue,
    replies: &'static ReplyQueue,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = GOVERNOR_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            config,
        )
        .expect("failed to initialize console UART")
    };

    let (mut uart_tx, mut uart_rx) = uart.split();
    let mut assembler = LineAssembler::new();
    let mut ingress = [0u8; CONSOLE_LINE_CAPACITY];

    loop {
        let count = match uart_rx.read(&mut ingress).await {
            Ok(count) => count,
            Err(_) => {
                defmt::warn!("console: UART read error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
        };

        for byte in &ingress[..count] {
            let reply = match assembler.push(*byte) {
                LineEvent::Pending => continue,
                LineEvent::Overflow => render(&"ERR line too long"),
                LineEvent::Line(line) => {
                    log_command(line.as_str());
                    answer(line.as_str(), commands, replies).await
                }
            };

            if uart_tx.write_all(reply.as_bytes()).await.is_err()
                || uart_tx.write_all(b"\r\n").await.is_err()
                || uart_tx.flush().await.is_err()
            {
                defmt::warn!("console: UART write error");
                Timer::after(Duration::from_millis(5)).await;
            }
        }
    }
}

async fn answer(line: &str, commands: &CommandQueue, replies: &ReplyQueue) -> ReplyLine {
    match route(line) {
        Route::Local(reply) => {
            log_reply(&reply, !reply.starts_with("ERR"));
            reply
        }
        Route::Status => render(&status::summary()),
        Route::Controller(command) => {
            commands.send(command).await;
            render(&replies.receive().await)
        }
    }
}
