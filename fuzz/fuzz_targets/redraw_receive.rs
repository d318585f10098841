#![no_main]

use libfuzzer_sys::fuzz_target;
use the_redraw::{
  HandlerError,
  HandlerRegistry,
  NotificationReceiver,
};

#[derive(Default)]
struct Seen {
  calls: usize,
}

fuzz_target!(|data: &[u8]| {
  let registry = HandlerRegistry::<Seen>::new();
  for name in ["grid_resize", "grid_line", "flush"] {
    registry.register_fn(name, |seen, args| {
      seen.calls += 1;
      if args.is_empty() {
        return Err(HandlerError::invalid("no invocations"));
      }
      Ok(())
    });
  }
  let receiver = NotificationReceiver::new(registry);

  let mut seen = Seen::default();
  if let Ok(report) = receiver.on_notification(&mut seen, data) {
    assert_eq!(report.invoked, seen.calls);
  }
});
