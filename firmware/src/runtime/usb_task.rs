use super::{LINE_QUEUE, TX_QUEUE, USB_STORAGE};
use crate::status;
use crate::transport::{LineAssembler, LineSender, TxFrame, TxReceiver};
use crate::usb::{self, UsbDeviceStrings};
use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::driver::EndpointError;

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let mut serial = usb::UsbSerial::new(driver, storage, UsbDeviceStrings::default());
    let console = serial
        .take_console()
        .expect("console CDC interface unavailable");
    let mut device = serial.device;

    join(run_device(&mut device), run_console(console)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_device<D>(device: &mut embassy_usb::UsbDevice<'static, D>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    loop {
        device.run_until_suspend().await;
        status::set_port_suspended(true);
        device.wait_resume().await;
        status::set_port_suspended(false);
    }
}

async fn run_console<D>(console: usb::ConsoleHandle<D>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let usb::ConsoleHandle {
        mut sender,
        mut receiver,
        control,
    } = console;

    let line_queue: LineSender<'static> = LINE_QUEUE.sender();
    let tx_queue: TxReceiver<'static> = TX_QUEUE.receiver();
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut tx_packet = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut assembler = LineAssembler::new();
    let mut pending_tx: Option<TxFrame> = None;

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &mut sender).await;
        pending_tx.take();
        status::set_port_configured(true);

        defmt::info!("usb: console connected");

        loop {
            if status::detach_requested() {
                defmt::info!("usb: detach requested");
                break;
            }

            match select3(
                receiver.read_packet(&mut ingress),
                async {
                    if pending_tx.is_none() {
                        pending_tx = Some(tx_queue.receive().await);
                    }

                    let frame = pending_tx
                        .as_ref()
                        .expect("pending frame missing during console write");
                    let mut written = 0;
                    while written < frame.len() {
                        let len = (frame.len() - written).min(tx_packet.len());
                        tx_packet[..len].copy_from_slice(&frame[written..written + len]);
                        if let Err(err) = sender.write_packet(&tx_packet[..len]).await {
                            return Err(err);
                        }
                        written += len;
                    }
                    pending_tx.take();
                    Ok(written)
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(count)) => {
                    for &byte in &ingress[..count] {
                        if let Some(line) = assembler.push(byte)
                            && line_queue.try_send(line).is_err()
                        {
                            defmt::warn!("usb: dropping command line (queue full)");
                        }
                    }
                }
                Either3::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console disabled");
                    break;
                }
                Either3::First(Err(_)) => {
                    defmt::warn!("usb: console read error");
                }
                Either3::Second(Ok(_)) => {}
                Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console write disabled");
                    break;
                }
                Either3::Second(Err(_)) => {
                    defmt::warn!("usb: console write error");
                }
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: host dropped DTR");
                        pending_tx.take();
                        break;
                    }
                }
            }
        }

        status::set_port_configured(false);
    }
}

async fn wait_for_dtr<D>(
    control: &embassy_usb::class::cdc_acm::ControlChanged<'static>,
    sender: &mut embassy_usb::class::cdc_acm::Sender<'static, D>,
) where
    D: embassy_usb::driver::Driver<'static>,
{
    if sender.dtr() {
        return;
    }

    while !sender.dtr() {
        control.control_changed().await;
    }
}
