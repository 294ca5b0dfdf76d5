use drill_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Share of the whole machine, in percent, above which step timings are suspect.
const HIGH_CPU_SHARE_PCT: f32 = 10.0;

/// Watches the drill's own CPU usage while a suite runs.
///
/// A drill that competes with the system under test for CPU slows the recovery it is measuring.
/// This never stops the drill. It warns once when usage goes above [HIGH_CPU_SHARE_PCT] and again
/// only after usage has dropped back below it, then logs the peak when the suite is done.
#[derive(Debug, Default)]
struct CpuWatch {
    high: bool,
    peak_pct: f32,
}

impl CpuWatch {
    /// Record a sample. Returns true when this sample starts a high usage episode.
    fn observe(&mut self, share_pct: f32) -> bool {
        self.peak_pct = self.peak_pct.max(share_pct);

        let was_high = self.high;
        self.high = share_pct > HIGH_CPU_SHARE_PCT;
        self.high && !was_high
    }
}

/// `process_usage` is as reported by sysinfo, 100% per fully used core.
fn machine_share_pct(process_usage: f32, cpu_count: usize) -> f32 {
    process_usage / cpu_count.max(1) as f32
}

/// Sample the drill process every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] until the listener fires.
pub(crate) fn start_monitor(stop_listener: DelegatedShutdownListener) {
    let spawned = std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();
            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len();

            let mut watch = CpuWatch::default();
            while !stop_listener.should_shutdown() {
                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );
                let Some(process) = sys.process(pid) else {
                    log::debug!("Drill process not visible to the monitor, stopping");
                    break;
                };

                let share = machine_share_pct(process.cpu_usage(), cpu_count);
                if watch.observe(share) {
                    log::warn!(
                        "The drill is using {share:.2}% of {cpu_count} cores, \
                        step timings may be inflated"
                    );
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }

            log::debug!("Peak drill CPU usage was {:.2}%", watch.peak_pct);
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start resource monitor: {e:?}");
    }
}
