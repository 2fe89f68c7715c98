//! Property tests for frame I/O over byte streams.

use huddle_core::wire::{read_frame, write_frame};
use huddle_proto::{Frame, FrameHeader, Opcode};
use proptest::prelude::*;
use tokio::io::AsyncWriteExt;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().build().expect("runtime")
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (prop::sample::select(Opcode::ALL.to_vec()), prop::collection::vec(any::<u8>(), 0..256))
        .prop_map(|(opcode, payload)| Frame::new(FrameHeader::new(opcode), payload))
}

proptest! {
    #[test]
    fn prop_frames_arrive_in_order(frames in prop::collection::vec(arbitrary_frame(), 0..16)) {
        let received = runtime().block_on(async {
            // A small pipe forces frames to be split across reads.
            let (mut client, mut server) = tokio::io::duplex(7);

            let sent = frames.clone();
            let writer = tokio::spawn(async move {
                for frame in &sent {
                    write_frame(&mut client, frame).await.expect("write");
                }
                client.shutdown().await.expect("shutdown");
            });

            let mut received = Vec::new();
            while let Some(frame) = read_frame(&mut server).await.expect("read") {
                received.push(frame);
            }
            writer.await.expect("writer");
            received
        });

        prop_assert_eq!(received, frames);
    }

    #[test]
    fn prop_garbage_streams_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        runtime().block_on(async {
            let mut reader = bytes.as_slice();
            while let Ok(Some(_)) = read_frame(&mut reader).await {}
        });
    }
}
