//! Raw socket setup. Plain `libc` syscalls, in the style of this
//! codebase's existing echo-server demos — no abstraction over the
//! kernel beyond what's needed to get a non-blocking fd.

use std::io;
use std::os::unix::io::RawFd;

/// Bind and listen on `0.0.0.0:port` with `SO_REUSEADDR|SO_REUSEPORT`,
/// non-blocking, `CLOEXEC`. Backlog is generous since the accept loop
/// drains in a tight loop.
pub fn listen_tcp(port: u16) -> io::Result<RawFd> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        set_reuse(fd)?;

        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as u16;
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
        addr.sin_port = port.to_be();

        let rc = libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as u32,
        );
        if rc != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        if libc::listen(fd, 4096) != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(fd)
    }
}

/// Bind a UDP socket on `0.0.0.0:port` with `SO_REUSEADDR|SO_REUSEPORT`,
/// non-blocking, `CLOEXEC`.
pub fn bind_udp(port: u16) -> io::Result<RawFd> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        set_reuse(fd)?;

        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as u16;
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
        addr.sin_port = port.to_be();

        let rc = libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as u32,
        );
        if rc != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(fd)
    }
}

unsafe fn set_reuse(fd: RawFd) -> io::Result<()> {
    let opt: libc::c_int = 1;
    let sz = std::mem::size_of::<libc::c_int>() as u32;
    if libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &opt as *const _ as *const _, sz) != 0 {
        return Err(io::Error::last_os_error());
    }
    if libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, &opt as *const _ as *const _, sz) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Accept one connection, non-blocking. Returns `Ok(None)` on
/// `EAGAIN`/`EWOULDBLOCK` ("no more pending").
pub fn accept_one(listen_fd: RawFd) -> io::Result<Option<(RawFd, String, u16)>> {
    unsafe {
        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as u32;
        let fd = libc::accept4(
            listen_fd,
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut addr_len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        );
        if fd < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => Ok(None),
                _ => Err(err),
            };
        }
        let ip = ipv4_to_string(u32::from_be(addr.sin_addr.s_addr));
        let port = u16::from_be(addr.sin_port);
        Ok(Some((fd, ip, port)))
    }
}

/// Read into `buf`, non-blocking. `Ok(0)` means EOF; `Ok(None)`-shaped
/// would-block is folded into `Ok(Some(0))` being impossible — callers
/// distinguish would-block via `Ok(None)`.
pub fn recv_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<Option<usize>> {
    unsafe {
        let n = libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => Ok(None),
                _ => Err(err),
            };
        }
        Ok(Some(n as usize))
    }
}

/// Write-loop into `fd` until the buffer is flushed or the socket
/// reports would-block. Returns the number of bytes actually written;
/// per the outbound backpressure contract (§9 "outbound send under
/// backpressure" — specified as-is), any remainder is dropped by the
/// caller, not buffered here.
pub fn send_best_effort(fd: RawFd, buf: &[u8]) -> usize {
    let mut written = 0usize;
    while written < buf.len() {
        let n = unsafe {
            libc::write(
                fd,
                buf[written..].as_ptr() as *const libc::c_void,
                buf.len() - written,
            )
        };
        if n < 0 {
            break;
        }
        if n == 0 {
            break;
        }
        written += n as usize;
    }
    written
}

pub fn recvfrom_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<Option<(usize, String, u16)>> {
    unsafe {
        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as u32;
        let n = libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut addr_len,
        );
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => Ok(None),
                _ => Err(err),
            };
        }
        let ip = ipv4_to_string(u32::from_be(addr.sin_addr.s_addr));
        let port = u16::from_be(addr.sin_port);
        Ok(Some((n as usize, ip, port)))
    }
}

pub fn sendto(fd: RawFd, buf: &[u8], ip: &str, port: u16) -> io::Result<usize> {
    let octets: Vec<u8> = ip.split('.').filter_map(|p| p.parse::<u8>().ok()).collect();
    if octets.len() != 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad ipv4 address"));
    }
    unsafe {
        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as u16;
        addr.sin_port = port.to_be();
        addr.sin_addr.s_addr = u32::from_be_bytes([octets[0], octets[1], octets[2], octets[3]]).to_be();

        let n = libc::sendto(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            0,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as u32,
        );
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

pub fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn ipv4_to_string(addr: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (addr >> 24) & 0xff,
        (addr >> 16) & 0xff,
        (addr >> 8) & 0xff,
        addr & 0xff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_formats_correctly() {
        assert_eq!(ipv4_to_string(0x7f000001), "127.0.0.1");
        assert_eq!(ipv4_to_string(0), "0.0.0.0");
    }

    #[test]
    fn listen_and_bind_real_sockets() {
        // Port 0 asks the kernel for an ephemeral port, exercising the
        // same bind/listen path production ports take.
        let tcp_fd = listen_tcp(0).expect("listen_tcp should succeed on an ephemeral port");
        close_fd(tcp_fd);

        let udp_fd = bind_udp(0).expect("bind_udp should succeed on an ephemeral port");
        close_fd(udp_fd);
    }
}
