// src/discovery/netlink.rs
//! Kernel uevent notifications over a netlink socket

use super::{
    subscription::{NotificationChannel, Subscription},
    Action, Attributes, DeviceEvent,
};
use crate::error::{GpsError, Result};
use async_trait::async_trait;
use std::{
    io, mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
};
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

/// Multicast group the kernel publishes uevents on
const KERNEL_UEVENT_GROUP: u32 = 1;

const RECV_BUFFER_SIZE: usize = 8192;

/// Connects a fresh uevent socket for every subscription
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkChannel;

impl NotificationChannel for NetlinkChannel {
    fn open(&self) -> Result<Box<dyn Subscription>> {
        let socket = UeventSocket::connect().map_err(|e| {
            GpsError::Source(format!("unable to connect to kernel netlink socket: {}", e))
        })?;
        Ok(Box::new(socket))
    }
}

/// `NETLINK_KOBJECT_UEVENT` datagram socket, closed on drop
pub struct UeventSocket {
    fd: AsyncFd<OwnedFd>,
    buf: Vec<u8>,
}

impl UeventSocket {
    pub fn connect() -> io::Result<Self> {
        // SAFETY: plain socket(2) call; the result is checked before use
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain data, all-zero is a valid value
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_groups = KERNEL_UEVENT_GROUP;

        // SAFETY: addr outlives the call and the length matches its type
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd: AsyncFd::new(fd)?,
            buf: vec![0; RECV_BUFFER_SIZE],
        })
    }

    async fn recv(&mut self) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            let buf = &mut self.buf;
            let result = guard.try_io(|inner| {
                // SAFETY: buf is valid for writes of buf.len() bytes
                let n = unsafe {
                    libc::recv(
                        inner.get_ref().as_raw_fd(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                        0,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(received) => return received,
                Err(_would_block) => continue,
            }
        }
    }
}

#[async_trait]
impl Subscription for UeventSocket {
    async fn next_event(&mut self) -> Result<DeviceEvent> {
        loop {
            let len = match self.recv().await {
                Ok(len) => len,
                // Receive queue overflowed; events were lost but the socket is fine
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    warn!("uevent queue overflow, some notifications were dropped");
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GpsError::Source(format!("uevent receive failed: {}", e))),
            };

            match decode_uevent(&self.buf[..len]) {
                Some(event) => return Ok(event),
                None => debug!(len, "ignoring undecodable uevent"),
            }
        }
    }
}

/// Decode a kernel message of the form `action@devpath\0KEY=VALUE\0...`
pub fn decode_uevent(message: &[u8]) -> Option<DeviceEvent> {
    let mut fields = message
        .split(|&b| b == 0)
        .filter(|field| !field.is_empty())
        .filter_map(|field| std::str::from_utf8(field).ok());

    let header = fields.next()?;
    let (header_action, _devpath) = header.split_once('@')?;

    let attrs: Attributes = fields
        .filter_map(|field| field.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    let action = Action::from(
        attrs
            .get("ACTION")
            .map(String::as_str)
            .unwrap_or(header_action),
    );

    Some(DeviceEvent { action, attrs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_add_event() {
        let message = b"add@/devices/pci0000:00/usb1/1-2/1-2:1.0/ttyUSB0/tty/ttyUSB0\0\
            ACTION=add\0DEVPATH=/devices/pci0000:00/usb1/1-2/1-2:1.0/ttyUSB0/tty/ttyUSB0\0\
            SUBSYSTEM=tty\0MAJOR=188\0MINOR=0\0DEVNAME=ttyUSB0\0SEQNUM=4242\0";
        let event = decode_uevent(message).unwrap();
        assert_eq!(event.action, Action::Add);
        assert_eq!(event.attrs.get("SUBSYSTEM").map(String::as_str), Some("tty"));
        assert_eq!(event.device_path().unwrap().to_string(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_decode_falls_back_to_header_action() {
        let event = decode_uevent(b"remove@/devices/virtual/tty/ttyUSB1\0DEVNAME=ttyUSB1\0").unwrap();
        assert_eq!(event.action, Action::Remove);
    }

    #[test]
    fn test_decode_rejects_udev_daemon_format() {
        assert!(decode_uevent(b"libudev\0\xfe\xed\xca\xfe").is_none());
        assert!(decode_uevent(b"").is_none());
    }
}
