use std::{
	io,
	sync::{
		atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering::SeqCst},
		mpsc, Arc,
	},
	thread,
	time::Duration,
};

use sepal::{Error, Status, ThreadPoolRuntime};

use _validator::Validator;

type CacheSlot<T> = sepal::CacheSlot<T, ThreadPoolRuntime>;

fn remote_slot(remote: &Arc<AtomicU32>) -> CacheSlot<u32> {
	let remote = Arc::clone(remote);
	CacheSlot::new(move || Ok::<_, Error>(remote.load(SeqCst)))
}

fn wait_until(condition: impl Fn() -> bool) {
	for _ in 0..1000 {
		if condition() {
			return;
		}
		thread::sleep(Duration::from_millis(5));
	}
	panic!("Condition not reached in time.");
}

#[test]
fn commits_the_body_value() {
	let remote = Arc::new(AtomicU32::new(1));
	let slot = remote_slot(&remote);
	assert_eq!(slot.get().unwrap(), Some(1));

	let updated = slot.update(|| Ok::<_, Error>(2), Status::Updating);
	assert_eq!(updated.unwrap(), Some(2));
	assert_eq!(slot.get_if_present(false), Some(2));
	assert_eq!(slot.get().unwrap(), Some(2));
	assert_eq!(slot.status(), Some(Status::Ok));
}

#[test]
fn readers_see_old_or_new_value() {
	let remote = Arc::new(AtomicU32::new(1));
	let slot = remote_slot(&remote);
	assert_eq!(slot.get().unwrap(), Some(1));

	let done = Arc::new(AtomicBool::new(false));
	let readers = (0..4)
		.map(|_| {
			let slot = slot.clone();
			let done = Arc::clone(&done);
			thread::spawn(move || {
				let mut seen = Vec::new();
				while !done.load(SeqCst) {
					seen.push(slot.get_if_present(false));
				}
				seen.push(slot.get_if_present(false));
				seen
			})
		})
		.collect::<Vec<_>>();

	let updated = slot.update(
		|| {
			thread::sleep(Duration::from_millis(50));
			remote.store(2, SeqCst);
			Ok::<_, Error>(2)
		},
		Status::Updating,
	);
	assert_eq!(updated.unwrap(), Some(2));
	done.store(true, SeqCst);

	for reader in readers {
		let seen = reader.join().unwrap();
		assert!(seen.iter().all(|value| matches!(value, Some(1 | 2))));
		assert_eq!(seen.last(), Some(&Some(2)));
	}
}

#[test]
fn failure_keeps_latest_value() {
	let remote = Arc::new(AtomicU32::new(1));
	let slot = remote_slot(&remote);
	assert_eq!(slot.get().unwrap(), Some(1));

	let error = slot
		.update(|| Err::<u32, _>("conflict"), Status::Updating)
		.unwrap_err();
	assert_eq!(error.to_string(), "conflict");
	assert_eq!(slot.get_if_present(false), Some(1));
	assert_eq!(slot.status(), Some(Status::Unknown));
}

#[test]
fn slot_errors_are_not_rewrapped() {
	let slot = remote_slot(&Arc::new(AtomicU32::new(1)));
	let error = slot
		.update(
			|| Err::<u32, _>(Error::new(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))),
			Status::Updating,
		)
		.unwrap_err();
	assert_eq!(
		error.downcast_ref::<io::Error>().map(io::Error::kind),
		Some(io::ErrorKind::PermissionDenied)
	);
}

#[test]
fn panicking_body_is_contained() {
	let remote = Arc::new(AtomicU32::new(1));
	let slot = remote_slot(&remote);
	assert_eq!(slot.get().unwrap(), Some(1));

	let error = slot
		.update(|| -> Result<u32, Error> { panic!("expected test panic") }, Status::Updating)
		.unwrap_err();
	assert!(matches!(error, Error::Panicked(_)));
	assert_eq!(slot.get_if_present(false), Some(1));
	assert_eq!(slot.status(), Some(Status::Unknown));
	assert_eq!(slot.update(|| Ok::<_, Error>(3), Status::Updating).unwrap(), Some(3));
}

#[test]
fn update_then_reload_uses_the_supplier() {
	let remote = Arc::new(AtomicU32::new(1));
	let slot = remote_slot(&remote);
	assert_eq!(slot.get().unwrap(), Some(1));

	let updated = slot.update_then_reload(
		|| {
			remote.store(5, SeqCst);
			Ok::<_, Error>(())
		},
		Status::Updating,
	);
	assert_eq!(updated.unwrap(), Some(5));
	assert_eq!(slot.get().unwrap(), Some(5));

	let error = slot
		.update_then_reload(|| Err("rejected"), Status::Updating)
		.unwrap_err();
	assert_eq!(error.to_string(), "rejected");
	assert_eq!(slot.get_if_present(false), Some(5));
}

#[test]
fn custom_labels_are_reported() {
	let statuses = Arc::new(Validator::new());
	let remote = Arc::new(AtomicU32::new(1));
	let slot = remote_slot(&remote).on_status_changed({
		let statuses = Arc::clone(&statuses);
		move |status| statuses.push(status)
	});

	slot.update(|| Ok::<_, Error>(4), Status::Custom("Deploying"))
		.unwrap();
	slot.runtime().settle();
	statuses.expect([Some(Status::Custom("Deploying")), Some(Status::Ok)]);
}

#[test]
fn updates_are_serialised() {
	let slot = remote_slot(&Arc::new(AtomicU32::new(0)));
	let active = Arc::new(AtomicUsize::new(0));
	let overlapped = Arc::new(AtomicBool::new(false));

	let writers = (1..=4)
		.map(|n| {
			let slot = slot.clone();
			let active = Arc::clone(&active);
			let overlapped = Arc::clone(&overlapped);
			thread::spawn(move || {
				slot.update(
					|| {
						if active.fetch_add(1, SeqCst) > 0 {
							overlapped.store(true, SeqCst);
						}
						thread::sleep(Duration::from_millis(20));
						active.fetch_sub(1, SeqCst);
						Ok::<_, Error>(n)
					},
					Status::Updating,
				)
				.unwrap()
			})
		})
		.collect::<Vec<_>>();

	for writer in writers {
		assert!(writer.join().unwrap().is_some());
	}
	assert!(!overlapped.load(SeqCst));
	assert_eq!(slot.status(), Some(Status::Ok));
}

#[test]
fn update_waits_for_the_load_in_flight() {
	let (release, gate) = mpsc::channel::<()>();
	let gate = std::sync::Mutex::new(gate);
	let slot = CacheSlot::new(move || {
		gate.lock().unwrap().recv().unwrap();
		Ok::<_, Error>(1)
	});

	let reader = thread::spawn({
		let slot = slot.clone();
		move || slot.get().unwrap()
	});
	wait_until(|| slot.is_processing());

	let writer = thread::spawn({
		let slot = slot.clone();
		move || slot.update(|| Ok::<_, Error>(2), Status::Updating).unwrap()
	});
	thread::sleep(Duration::from_millis(20));
	assert_eq!(slot.status(), Some(Status::Loading));

	release.send(()).unwrap();
	assert_eq!(reader.join().unwrap(), Some(1));
	assert_eq!(writer.join().unwrap(), Some(2));
	assert_eq!(slot.get().unwrap(), Some(2));
}

#[test]
fn reader_loads_after_failed_update() {
	let remote = Arc::new(AtomicU32::new(10));
	let slot = remote_slot(&remote);
	let (release, gate) = mpsc::channel::<()>();

	let writer = thread::spawn({
		let slot = slot.clone();
		move || {
			slot.update(
				move || {
					gate.recv().unwrap();
					Err::<u32, _>("rejected")
				},
				Status::Updating,
			)
		}
	});
	wait_until(|| slot.is_processing());

	let reader = thread::spawn({
		let slot = slot.clone();
		move || slot.get()
	});
	thread::sleep(Duration::from_millis(20));
	release.send(()).unwrap();

	assert!(writer.join().unwrap().is_err());
	assert_eq!(reader.join().unwrap().unwrap(), Some(10));
}
