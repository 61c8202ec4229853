//! Watches a configuration key (a file under a scratch directory) and
//! reports the first change, racing it against a cancellation token.

use std::fs;
use std::thread;
use std::time::Duration;

use repose::exec::block_on;
use repose::os::{ChangeKinds, watch_key};
use repose::sync::CancellationToken;

fn main() {
    let dir = std::env::temp_dir().join(format!("repose-demo-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let key = dir.join("endpoint");
    fs::write(&key, "https://old.example").unwrap();

    let token = CancellationToken::new();
    let watch = match watch_key(&key, false, ChangeKinds::CONTENTS, Some(&token)) {
        Ok(watch) => watch,
        Err(err) => {
            eprintln!("cannot watch configuration keys here: {err}");
            return;
        }
    };

    // Writer updates the key shortly; the canceller would fire later and
    // loses the race.
    let writer = {
        let key = key.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            fs::write(&key, "https://new.example").unwrap();
        })
    };
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(5));
            token.cancel();
        })
    };

    match block_on(watch) {
        Ok(()) => println!("key changed: {}", fs::read_to_string(&key).unwrap()),
        Err(err) => println!("watch ended without a change: {err}"),
    }

    writer.join().unwrap();
    token.cancel();
    canceller.join().unwrap();
    fs::remove_dir_all(&dir).unwrap();
}
