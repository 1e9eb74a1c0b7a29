/*!
 * RT Nucleus - Demo Entry Point
 *
 * Boots a nucleus from the environment, installs a TP schedule and a couple
 * of quota groups, then runs a producer/consumer exchange over a queue.
 */

use rt_nucleus::{
    init_tracing, Deadline, MessageQueue, Nucleus, NucleusConfig, ParamEx, Policy, QueueAttr,
    SendMode, ThreadAttr, TpWindowSpec, WaitOrder,
};
use std::error::Error;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const MESSAGES: usize = 8;

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let nucleus = Nucleus::new(NucleusConfig::from_env()?)?;
    info!("================================================");

    let ms = Duration::from_millis;
    nucleus.set_tp_schedule(
        0,
        &[
            TpWindowSpec::new(ms(0), ms(10), 0),
            TpWindowSpec::new(ms(10), ms(15), 1),
            TpWindowSpec::idle(ms(25), ms(5)),
        ],
    )?;
    if let Some(schedule) = nucleus.tp_schedule(0)? {
        info!("TP schedule on CPU 0: {}", serde_json::to_string(&schedule)?);
    }

    let main_thread = nucleus.spawn_thread(ThreadAttr::new(50).named("main"))?;
    let bulk = nucleus.quota_add_group_with_limit(&main_thread, 0, false, 60, 80)?;
    let burst = nucleus.quota_add_group_with_limit(&main_thread, 0, false, 70, 70)?;
    if burst.quota_sum > 100 {
        warn!(
            "CPU 0 quota over-committed: {}% across groups {} and {}",
            burst.quota_sum, bulk.group, burst.group
        );
    }

    let queue = MessageQueue::create(
        &nucleus,
        &main_thread,
        QueueAttr::new(16 * 1024)
            .named("telemetry")
            .with_limit(MESSAGES)
            .with_order(WaitOrder::Priority),
    )?;

    let consumer = {
        let nucleus = nucleus.clone();
        let group = bulk.group;
        thread::Builder::new().name("consumer".into()).spawn(move || -> Result<usize, rt_nucleus::CoreError> {
            let me = nucleus.spawn_thread(ThreadAttr::new(40).named("consumer"))?;
            nucleus.set_thread_policy(&me, Policy::Quota, &ParamEx::priority(40).with_quota_group(group))?;
            let queue = MessageQueue::bind(&nucleus, &me, "telemetry", Deadline::after(Duration::from_secs(1)))?;

            let mut received = 0;
            let mut dest = [0u8; 64];
            loop {
                match queue.read(&me, &mut dest, Deadline::after(Duration::from_millis(200))) {
                    Ok(len) => {
                        info!("consumer got {:?}", String::from_utf8_lossy(&dest[..len]));
                        received += 1;
                    }
                    Err(rt_nucleus::CoreError::TimedOut) | Err(rt_nucleus::CoreError::Abandoned) => break,
                    Err(e) => return Err(e),
                }
            }
            nucleus.detach_thread(&me)?;
            Ok(received)
        })?
    };

    for seq in 0..MESSAGES {
        let payload = format!("sample #{seq}");
        if seq % 2 == 0 {
            queue.write(payload.as_bytes(), SendMode::Normal)?;
        } else {
            let buf = queue.alloc(payload.len())?;
            buf.fill(payload.as_bytes());
            queue.send(&buf, payload.len(), SendMode::Normal)?;
        }
        thread::sleep(Duration::from_millis(5));
    }

    info!("Queue state: {}", serde_json::to_string(&queue.inquire()?)?);
    if let Some(window) = nucleus.tp_active_window(0)? {
        info!("Active TP window: {:?}", window);
    }

    let received = consumer
        .join()
        .map_err(|_| "consumer thread panicked")??;
    info!("Consumer received {} of {} messages", received, MESSAGES);

    queue.delete(&main_thread)?;
    let removed = nucleus.quota_cleanup(main_thread.pid());
    info!("Cleaned up {} quota groups", removed);
    Ok(())
}
