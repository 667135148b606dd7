pub mod mutex {
    use alloc::{sync::Arc, vec::Vec};
    use keos::{
        sync::atomic::{AtomicBool, AtomicUsize},
        thread::{ThreadBuilder, ThreadState},
    };
    use keos_sched::sync::mutex::Mutex;

    pub fn smoke() {
        const LENGTH: usize = 64;
        let output = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::new(AtomicUsize::new(0));

        for i in 0..LENGTH {
            let counter = counter.clone();
            let counter2 = counter2.clone();
            let output = output.clone();
            ThreadBuilder::new("smoker").spawn(move || {
                counter.fetch_add(1);
                let mut d = output.lock();
                while counter.load() != LENGTH {}
                d.push(i);
                counter2.fetch_add(1);
                d.unlock();
            });
        }

        while counter2.load() != LENGTH {}

        let mut output = output.lock();
        output.sort();
        assert_eq!(&*output, &(0..LENGTH).collect::<Vec<_>>());
        output.unlock();
    }

    pub fn smoke_many() {
        for i in 0..100 {
            keos::println!("Iteration #{i:}");
            smoke()
        }
    }

    pub fn parking() {
        let mutex = Arc::new(Mutex::new(()));
        let guard = mutex.lock();
        let thread_spawned = Arc::new(AtomicBool::new(false));

        let be_parked = {
            let (thread_spawned, mutex) = (thread_spawned.clone(), mutex.clone());
            ThreadBuilder::new("blockee").spawn(move || {
                thread_spawned.store(true);
                let guard = mutex.lock();
                guard.unlock();
            })
        };

        while !thread_spawned.load() {
            core::hint::spin_loop();
        }
        for _ in 0..10000 {
            core::hint::spin_loop();
        }

        assert_eq!(
            keos::thread::get_state_by_tid(be_parked.tid),
            Ok(ThreadState::Parked),
            "Blocked thread by Mutex should be in Parked state"
        );

        guard.unlock();
        be_parked.join();
    }
}

pub mod priority {
    use alloc::sync::Arc;
    use keos::{
        sync::atomic::AtomicBool,
        thread::{ThreadBuilder, ThreadState, get_state_by_tid},
    };
    use keos_sched::{priority, sync::mutex::Mutex};

    /// A low-priority holder should be boosted to a blocked waiter's
    /// priority, and released back to its own once the lock is handed off.
    pub fn donation_basic() {
        let lock = Arc::new(Mutex::new(()));
        let low_acquired = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let high_acquired = Arc::new(AtomicBool::new(false));

        let low_builder = ThreadBuilder::new("low");
        let low_tid = low_builder.get_tid();
        let low = {
            let (lock, low_acquired, release) =
                (lock.clone(), low_acquired.clone(), release.clone());
            low_builder.spawn(move || {
                priority::set_base_priority(10);
                let guard = lock.lock();
                low_acquired.store(true);
                while !release.load() {
                    core::hint::spin_loop();
                }
                guard.unlock();
            })
        };

        while !low_acquired.load() {
            core::hint::spin_loop();
        }
        assert_eq!(priority::effective(low_tid), 10);

        let high_builder = ThreadBuilder::new("high");
        let high_tid = high_builder.get_tid();
        let high = {
            let (lock, high_acquired) = (lock.clone(), high_acquired.clone());
            high_builder.spawn(move || {
                priority::set_base_priority(40);
                let guard = lock.lock();
                high_acquired.store(true);
                guard.unlock();
            })
        };

        while get_state_by_tid(high_tid) != Ok(ThreadState::Parked) {
            core::hint::spin_loop();
        }

        assert_eq!(
            priority::effective(low_tid),
            40,
            "low-priority holder must be donated the blocked waiter's priority"
        );

        release.store(true);
        low.join();
        high.join();

        assert!(high_acquired.load());
        assert_eq!(
            priority::effective(low_tid),
            10,
            "donation must be dropped once the donating lock is released"
        );
    }
}

pub mod condition_variable {
    use alloc::{sync::Arc, vec::Vec};
    use keos::{MAX_CPU, sync::atomic::AtomicUsize, thread::ThreadBuilder};
    use keos_sched::sync::{condition_variable::ConditionVariable, mutex::Mutex};

    const MAX: usize = 2;
    struct BufferInner {
        item: [usize; MAX],
        front: usize,
        tail: usize,
    }
    impl BufferInner {
        fn is_full(&self) -> bool {
            self.tail.overflowing_sub(self.front).0 % MAX == MAX - 1
        }
        fn is_empty(&self) -> bool {
            self.front == self.tail
        }
    }
    struct Buffer {
        inner: Mutex<BufferInner>,
        full: ConditionVariable,
        empty: ConditionVariable,
    }

    impl Buffer {
        fn put(&self, val: usize) {
            let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
            let tail = (guard.tail + 1) % MAX;
            guard.tail = tail;
            guard.item[tail] = val;
            self.empty.signal(guard);
        }

        fn put_many<const T: usize>(&self, val: [usize; T]) {
            let mut idx = 0;
            while idx < T {
                let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
                while !guard.is_full() && idx < T {
                    let tail = (guard.tail + 1) % MAX;
                    guard.tail = tail;
                    guard.item[tail] = val[idx];
                    idx += 1;
                }
                self.empty.broadcast(guard);
            }
        }

        fn get(&self) -> usize {
            let mut guard = self.empty.wait_while(&self.inner, |b| b.is_empty());
            let front = (guard.front + 1) % MAX;
            let item = guard.item[front];
            guard.front = front;
            self.full.signal(guard);
            item
        }
    }

    pub fn bounded_buffer_1() {
        let (buffer, waiters, output) = (
            Arc::new(Buffer {
                inner: Mutex::new(BufferInner {
                    item: [0; MAX],
                    front: 0,
                    tail: 0,
                }),
                full: ConditionVariable::new(),
                empty: ConditionVariable::new(),
            }),
            Arc::new(Arc::new(AtomicUsize::new(0))),
            Arc::new(Mutex::new(Vec::new())),
        );

        let consumers = [0; MAX_CPU * 2 + 2].map(|_| {
            let (buffer, waiters, output) = (buffer.clone(), waiters.clone(), output.clone());
            ThreadBuilder::new("consumer").spawn(move || {
                waiters.fetch_add(1);
                let d = buffer.get();
                let mut guard = output.lock();
                guard.push(d);
                guard.unlock();
            })
        });
        while waiters.load() != MAX_CPU * 2 + 2 {}

        let producer = {
            let buffer = buffer.clone();
            ThreadBuilder::new("producer").spawn(move || {
                for i in 0..MAX_CPU * 2 + 2 {
                    buffer.put(i);
                }
            })
        };

        for consumer in consumers {
            consumer.join();
        }
        producer.join();

        let mut output = output.lock();
        output.sort();
        assert_eq!(&*output, &(0..MAX_CPU * 2 + 2).collect::<Vec<_>>());
        output.unlock();
    }

    pub fn bounded_buffer_2() {
        let (buffer, waiters, output) = (
            Arc::new(Buffer {
                inner: Mutex::new(BufferInner {
                    item: [0; MAX],
                    front: 0,
                    tail: 0,
                }),
                full: ConditionVariable::new(),
                empty: ConditionVariable::new(),
            }),
            Arc::new(Arc::new(AtomicUsize::new(0))),
            Arc::new(Mutex::new(Vec::new())),
        );

        let consumers = [0; MAX_CPU * 2 + 2].map(|_| {
            let (buffer, waiters, output) = (buffer.clone(), waiters.clone(), output.clone());
            ThreadBuilder::new("consumer").spawn(move || {
                waiters.fetch_add(1);
                let d = buffer.get();
                let mut guard = output.lock();
                guard.push(d);
                guard.unlock();
            })
        });
        while waiters.load() != MAX_CPU * 2 + 2 {}
        for _ in 0..10000000 {
            core::hint::black_box(());
        }

        let producer = {
            let buffer = buffer.clone();
            ThreadBuilder::new("producer").spawn(move || {
                for i in (0..MAX_CPU * 2 + 2).array_chunks::<{ MAX_CPU / 2 }>() {
                    buffer.put_many(i);
                }
            })
        };

        for consumer in consumers {
            consumer.join();
        }
        producer.join();
        let mut output = output.lock();
        output.sort();
        assert_eq!(&*output, &(0..MAX_CPU * 2 + 2).collect::<Vec<_>>());
        output.unlock();
    }
}

pub mod semaphore {
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use keos::thread::ThreadBuilder;
    use keos_sched::sync::{Mutex, Semaphore};

    pub fn sema_0() {
        let sema = Arc::new(Semaphore::new(0, ()));
        let is_thread_active = Arc::new(AtomicBool::new(false));
        let is_woken_up = Arc::new(AtomicBool::new(false));

        let thread = {
            let (sema, is_thread_active, is_woken_up) =
                (sema.clone(), is_thread_active.clone(), is_woken_up.clone());

            ThreadBuilder::new("worker").spawn(move || {
                is_thread_active.store(true, Ordering::SeqCst);
                sema.wait();
                is_woken_up.store(true, Ordering::SeqCst);
            })
        };

        while !is_thread_active.load(Ordering::SeqCst) {
            core::hint::spin_loop();
        }

        assert!(!is_woken_up.load(Ordering::SeqCst));

        sema.signal();
        thread.join();

        assert!(is_woken_up.load(Ordering::SeqCst));
    }

    pub fn sema_1() {
        const COUNT: u32 = 16;
        let sema = Arc::new(Semaphore::new(1, ()));
        let ready_counter = Arc::new(AtomicU32::new(0));
        let counter = Arc::new(AtomicU32::new(0));

        for i in 0..COUNT {
            let (sema, ready_counter, counter) =
                (sema.clone(), ready_counter.clone(), counter.clone());

            ThreadBuilder::new(alloc::format!("t{i}")).spawn(move || {
                ready_counter.fetch_add(1, Ordering::SeqCst);

                let sema_permit = sema.wait();
                counter.fetch_add(1, Ordering::SeqCst);
                core::mem::forget(sema_permit);
            });
        }

        while ready_counter.load(Ordering::SeqCst) < COUNT {
            core::hint::spin_loop();
        }

        let mut expected_cnt = 1;

        while counter.load(Ordering::SeqCst) < COUNT {
            expected_cnt += 1;
            sema.signal();
            for _ in 0..10000 {
                core::hint::spin_loop();
            }

            assert_eq!(counter.load(Ordering::SeqCst), expected_cnt);
        }
    }

    pub fn sema_2() {
        const COUNT: u32 = 16;
        let sema = Arc::new(Semaphore::new(2, ()));
        let ready_counter = Arc::new(AtomicU32::new(0));
        let counter = Arc::new(AtomicU32::new(0));

        for i in 0..COUNT {
            let (sema, ready_counter, counter) =
                (sema.clone(), ready_counter.clone(), counter.clone());

            ThreadBuilder::new(alloc::format!("t{i}")).spawn(move || {
                ready_counter.fetch_add(1, Ordering::SeqCst);

                let sema_permit = sema.wait();
                counter.fetch_add(1, Ordering::SeqCst);
                core::mem::forget(sema_permit);
            });
        }

        while ready_counter.load(Ordering::SeqCst) < COUNT {
            core::hint::spin_loop();
        }

        let mut expected_cnt = 2;

        while counter.load(Ordering::SeqCst) < COUNT {
            expected_cnt += 2;
            sema.signal();
            sema.signal();
            for _ in 0..10000 {
                core::hint::spin_loop();
            }

            assert_eq!(counter.load(Ordering::SeqCst), expected_cnt);
        }
    }

    pub fn exec_order() {
        const COUNT: usize = 3;

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::new(AtomicUsize::new(0));
        let sema = Arc::new(Semaphore::new(0, 0));

        for i in 0..COUNT {
            let counter = counter.clone();
            let counter2 = counter2.clone();
            let sema = sema.clone();
            ThreadBuilder::new(alloc::format!("support_{}", i)).spawn(move || {
                counter2.fetch_add(1, Ordering::SeqCst);
                let _guard = sema.wait();
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        while counter2.load(Ordering::SeqCst) != COUNT {}
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    pub fn n_permits() {
        const COUNT: usize = 5;
        const PERMITS: usize = 3;

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::new(AtomicUsize::new(0));
        let sema = Arc::new(Semaphore::new(PERMITS, 0));
        let lock = Arc::new(Mutex::new(0));

        let guard = lock.lock();

        for i in 0..COUNT {
            let counter = counter.clone();
            let counter2 = counter2.clone();
            let sema = sema.clone();
            let lock = lock.clone();
            ThreadBuilder::new(alloc::format!("support_{}", i)).spawn(move || {
                counter2.fetch_add(1, Ordering::SeqCst);
                let _guard = sema.wait();
                counter.fetch_add(1, Ordering::SeqCst);
                let _lock = lock.lock();
                _lock.unlock();
            });
        }

        while counter2.load(Ordering::SeqCst) != COUNT {}
        assert_eq!(counter.load(Ordering::SeqCst), PERMITS);
        guard.unlock();
    }
}

pub mod rwlock {
    use alloc::{sync::Arc, vec::Vec};
    use keos::{
        sync::atomic::{AtomicBool, AtomicUsize},
        thread::ThreadBuilder,
    };
    use keos_sched::sync::{Mutex, rwlock::RwLock};

    pub fn concurrent_readers() {
        const READERS: usize = 8;
        let lock = Arc::new(RwLock::new(0usize));
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let (lock, active, max_seen) = (lock.clone(), active.clone(), max_seen.clone());
                ThreadBuilder::new("reader").spawn(move || {
                    let guard = lock.read();
                    let n = active.fetch_add(1) + 1;
                    if n > max_seen.load() {
                        max_seen.store(n);
                    }
                    while active.load() < READERS {
                        core::hint::spin_loop();
                    }
                    active.fetch_sub(1);
                    guard.unlock();
                })
            })
            .collect();

        for r in readers {
            r.join();
        }
        assert_eq!(max_seen.load(), READERS, "all readers must hold concurrently");
    }

    pub fn writer_excludes_readers() {
        let lock = Arc::new(RwLock::new(0usize));
        let guard = lock.write();
        let reader_done = Arc::new(AtomicBool::new(false));

        let reader = {
            let (lock, reader_done) = (lock.clone(), reader_done.clone());
            ThreadBuilder::new("reader").spawn(move || {
                let g = lock.read();
                reader_done.store(true);
                g.unlock();
            })
        };

        for _ in 0..10000 {
            core::hint::spin_loop();
        }
        assert!(!reader_done.load(), "reader must not run while a writer holds the lock");

        guard.unlock();
        reader.join();
        assert!(reader_done.load());
    }

    /// A reader arriving after a writer has started waiting must not cut in
    /// line ahead of it.
    pub fn writer_preference() {
        let lock = Arc::new(RwLock::new(0usize));
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let r1 = lock.read();
        let writer_waiting = Arc::new(AtomicBool::new(false));

        let writer = {
            let (lock, log, writer_waiting) = (lock.clone(), log.clone(), writer_waiting.clone());
            ThreadBuilder::new("writer").spawn(move || {
                writer_waiting.store(true);
                let mut g = lock.write();
                *g += 1;
                let mut l = log.lock();
                l.push("writer");
                l.unlock();
                g.unlock();
            })
        };

        while !writer_waiting.load() {
            core::hint::spin_loop();
        }
        for _ in 0..10000 {
            core::hint::spin_loop();
        }

        let late_reader = {
            let (lock, log) = (lock.clone(), log.clone());
            ThreadBuilder::new("late_reader").spawn(move || {
                let g = lock.read();
                let mut l = log.lock();
                l.push("reader");
                l.unlock();
                g.unlock();
            })
        };

        r1.unlock();
        writer.join();
        late_reader.join();

        let log = log.lock();
        assert_eq!(&*log, &["writer", "reader"]);
        log.unlock();
    }
}
