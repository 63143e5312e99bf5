#[cfg(all(test, feature = "loom"))]
mod tests {
    use crate::Context;
    use loom::sync::atomic::{AtomicUsize, Ordering};
    use loom::sync::Arc;
    use loom::{model::Builder, thread};

    #[test]
    fn test_concurrent_release_once() {
        let mut builder = Builder::new();
        if builder.preemption_bound.is_none() {
            builder.preemption_bound = Some(3);
        }

        builder.check(|| {
            let released = Arc::new(AtomicUsize::new(0));
            let counter = released.clone();
            let context = Context::builder()
                .sysfs_root("/nonexistent")
                .on_release(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build();

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let context = context.clone();
                    thread::spawn(move || {
                        assert!(context.ref_count() >= 1);
                        drop(context);
                    })
                })
                .collect();

            drop(context);
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(released.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_clone_while_releasing() {
        loom::model(|| {
            let released = Arc::new(AtomicUsize::new(0));
            let counter = released.clone();
            let context = Context::builder()
                .on_release(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build();
            let other = context.clone();

            let handle = thread::spawn(move || {
                let again = other.clone();
                drop(other);
                assert_eq!(again.sysfs().root().to_str(), Some("/sys"));
            });

            drop(context);
            handle.join().unwrap();
            assert_eq!(released.load(Ordering::SeqCst), 1);
        });
    }
}
