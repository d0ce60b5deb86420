//! CPU core pinning for worker threads (Linux).
//!
//! Each worker owns one hardware queue and busy-polls; pinning it to a
//! dedicated core is what keeps the poll loops out of each other's way.

use std::io;

/// Pin the current thread to a specific CPU core.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core_id: usize) -> io::Result<()> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};

    let mut set: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        CPU_ZERO(&mut set);
        CPU_SET(core_id, &mut set);
        if sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(_core_id: usize) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "Linux only"))
}

/// Parse a kernel-style cpulist such as `"0-3,8-11"`.
pub fn parse_cpulist(s: &str) -> io::Result<Vec<usize>> {
    fn bad(what: &str) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, what.to_string())
    }

    let mut cores = Vec::new();
    for part in s.trim().split(',') {
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.parse().map_err(|_| bad("bad range start"))?;
                let hi: usize = hi.parse().map_err(|_| bad("bad range end"))?;
                if hi < lo {
                    return Err(bad("descending range"));
                }
                cores.extend(lo..=hi);
            }
            None => cores.push(part.parse().map_err(|_| bad("bad core id"))?),
        }
    }
    Ok(cores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ranges_and_singles() {
        assert_eq!(parse_cpulist("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpulist("0,2,4").unwrap(), vec![0, 2, 4]);
        assert_eq!(parse_cpulist("0-2,8-10").unwrap(), vec![0, 1, 2, 8, 9, 10]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_cpulist("a-b").is_err());
        assert!(parse_cpulist("3-1").is_err());
    }
}
