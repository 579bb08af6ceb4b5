// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Pipeline integration tests against the simulated IL core.
//!
//! # Test Coverage
//!
//! - Open / shoot / close lifecycle and resource cleanliness
//! - Call ordering (tunnels, port enables, splitter configuration, state changes)
//! - Frame segmentation of multi-image bursts, including the ambiguous case
//! - Fail-fast behaviour on rejected calls and component error events
//! - Lifecycle misuse

use omx_still::{
    CaptureConfig, ComponentState, Error, EventFlags, FrameCollector, PipelineStage, Role,
    StillPipeline, WhiteBalance,
    backend::{Command, Config, Parameter},
    port::{
        CAMERA_CAPTURE, CAMERA_PREVIEW, ColorFormat, ENCODER_OUTPUT, ImageCoding, PortFormat,
        SPLITTER_OUTPUT, VideoFormat,
    },
    sim::{Call, ENCODER_BUFFER_SIZE, Operation, Simulator, jpeg::exif_jpeg},
    status,
};
use tracing_test::traced_test;

/// Opens a pipeline on a fresh simulator with the default configuration.
fn open_pipeline() -> (Simulator, StillPipeline<Simulator>) {
    let simulator = Simulator::new();
    let mut pipeline = StillPipeline::new(simulator.clone());
    pipeline.open(&CaptureConfig::default()).unwrap();
    (simulator, pipeline)
}

fn commands(journal: &[Call]) -> Vec<(Role, Command)> {
    journal
        .iter()
        .filter_map(|call| match call {
            Call::SendCommand { component, command } => Some((*component, *command)),
            _ => None,
        })
        .collect()
}

fn video_format(simulator: &Simulator, role: Role, port: u32) -> VideoFormat {
    match simulator.port_definition_of(role, port).unwrap().format {
        PortFormat::Video(video) => video,
        other => panic!("{role} port {port} has format {other:?}"),
    }
}

fn position(journal: &[Call], predicate: impl Fn(&Call) -> bool) -> usize {
    journal
        .iter()
        .position(predicate)
        .expect("call not found in journal")
}

#[test]
#[traced_test]
fn open_shoot_close_leaves_nothing_behind() {
    let (simulator, mut pipeline) = open_pipeline();
    assert_eq!(pipeline.stage(), PipelineStage::Executing);

    let report = simulator.report();
    assert!(report.initialized);
    assert_eq!(report.live_components, 4);
    assert_eq!(report.tunnels, 3);
    assert_eq!(report.allocated_buffers, 1);
    assert!(
        report
            .states
            .iter()
            .all(|(_, state)| *state == ComponentState::Executing)
    );
    assert!(!report.capturing);

    simulator.queue_images(1, 1000);
    let mut collector = FrameCollector::new();
    let summary = pipeline.shoot(1, &mut collector).unwrap();
    assert_eq!(summary.frames_requested, 1);
    assert_eq!(summary.images, 1);
    assert_eq!(collector.frames().len(), 1);
    assert!(!simulator.report().capturing);

    pipeline.close().unwrap();
    assert_eq!(pipeline.stage(), PipelineStage::Closed);
    assert!(simulator.report().is_clean());
    assert!(logs_contain("pipeline closed"));
}

#[test]
fn two_frame_burst_is_split_into_two_images() {
    let (simulator, mut pipeline) = open_pipeline();
    simulator.queue_images(2, 4096);

    let mut collector = FrameCollector::new();
    let summary = pipeline.shoot(2, &mut collector).unwrap();
    pipeline.close().unwrap();

    assert_eq!(summary.images, 2);
    assert_eq!(summary.buffers, 8);
    let frames = collector.into_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], exif_jpeg(0, 3 * 4096 + 17));
    assert_eq!(frames[1], exif_jpeg(1, 3 * 4096 + 17));
    assert_eq!(
        summary.bytes,
        (frames[0].len() + frames[1].len()) as u64
    );
}

#[test]
fn sink_sees_every_chunk_in_order_with_its_frame() {
    let (simulator, mut pipeline) = open_pipeline();
    simulator.queue_images(2, 100);

    let mut seen = Vec::new();
    pipeline
        .shoot(2, &mut |frame: u32, chunk: &[u8]| seen.push((frame, chunk.len())))
        .unwrap();
    pipeline.close().unwrap();

    // Each synthetic image spans three full chunks and a short tail.
    let expected: Vec<(u32, usize)> = [0, 1]
        .into_iter()
        .flat_map(|frame| [(frame, 100), (frame, 100), (frame, 100), (frame, 39)])
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn image_larger_than_the_output_buffer_spans_several_fills() {
    let (simulator, mut pipeline) = open_pipeline();
    let image = exif_jpeg(7, 200_000);
    simulator.queue_chunks([image.clone()]);

    let mut sizes = Vec::new();
    let mut collector = FrameCollector::new();
    pipeline
        .shoot(1, &mut |frame: u32, chunk: &[u8]| {
            sizes.push(chunk.len());
            omx_still::ChunkSink::accept(&mut collector, frame, chunk);
        })
        .unwrap();
    pipeline.close().unwrap();

    let capacity = ENCODER_BUFFER_SIZE as usize;
    assert_eq!(sizes, vec![capacity, capacity, image.len() - 2 * capacity]);
    assert_eq!(collector.frames(), &[image]);
}

#[test]
#[traced_test]
fn boundary_inside_a_chunk_is_not_detected() {
    let (simulator, mut pipeline) = open_pipeline();
    let first = exif_jpeg(0, 100);
    let second = exif_jpeg(1, 100);
    let mut straddling = first[50..].to_vec();
    straddling.extend_from_slice(&second[..60]);
    simulator.queue_chunks([first[..50].to_vec(), straddling, second[60..].to_vec()]);

    let mut collector = FrameCollector::new();
    let summary = pipeline.shoot(2, &mut collector).unwrap();
    pipeline.close().unwrap();

    assert_eq!(summary.images, 1);
    assert_eq!(collector.frames().len(), 1);
    assert!(logs_contain(
        "burst produced a different number of images than requested"
    ));
}

#[test]
fn consecutive_bursts_reuse_the_open_pipeline() {
    let (simulator, mut pipeline) = open_pipeline();

    simulator.queue_images(1, 512);
    let mut first = FrameCollector::new();
    assert_eq!(pipeline.shoot(1, &mut first).unwrap().images, 1);

    simulator.queue_images(3, 512);
    let mut second = FrameCollector::new();
    assert_eq!(pipeline.shoot(3, &mut second).unwrap().images, 3);
    assert_eq!(second.frames()[2], exif_jpeg(2, 3 * 512 + 17));

    pipeline.close().unwrap();
    assert!(simulator.report().is_clean());
}

#[test]
fn end_of_stream_is_drained_after_a_burst() {
    let (simulator, mut pipeline) = open_pipeline();
    simulator.queue_images(1, 256);
    pipeline.shoot(1, &mut FrameCollector::new()).unwrap();

    for role in [Role::Splitter, Role::Encoder] {
        let pending = pipeline.component(role).unwrap().events().pending().unwrap();
        assert!(
            !pending.intersects(EventFlags::BUFFER_FLAG | EventFlags::FILL_BUFFER_DONE),
            "{role} still has {pending:?}"
        );
    }
    pipeline.close().unwrap();
}

#[test]
fn pipeline_can_be_reopened_after_close() {
    let (simulator, mut pipeline) = open_pipeline();
    pipeline.close().unwrap();

    pipeline.open(&CaptureConfig::default()).unwrap();
    simulator.queue_images(1, 64);
    assert_eq!(pipeline.shoot(1, &mut FrameCollector::new()).unwrap().images, 1);
    pipeline.close().unwrap();
    assert!(simulator.report().is_clean());
}

#[test]
fn open_follows_the_il_ordering() {
    let (simulator, mut pipeline) = open_pipeline();
    let journal = simulator.journal();

    let tunnels: Vec<_> = journal
        .iter()
        .filter_map(|call| match call {
            Call::SetupTunnel { output, input } => Some((*output, *input)),
            _ => None,
        })
        .collect();
    assert_eq!(
        tunnels,
        vec![
            ((Role::Camera, 71), (Role::Splitter, 250)),
            ((Role::Splitter, 251), (Role::Encoder, 340)),
            ((Role::Camera, 70), (Role::NullSink, 240)),
        ]
    );

    // The splitter output is only configured once its input is tunneled.
    let video_tunnel = position(&journal, |call| matches!(call, Call::SetupTunnel { .. }));
    let splitter_output = position(&journal, |call| {
        matches!(
            call,
            Call::SetPortDefinition {
                component: Role::Splitter,
                port: SPLITTER_OUTPUT
            }
        )
    });
    let encode_tunnel = position(&journal, |call| {
        matches!(
            call,
            Call::SetupTunnel {
                output: (Role::Splitter, _),
                ..
            }
        )
    });
    assert!(video_tunnel < splitter_output && splitter_output < encode_tunnel);

    let enables: Vec<_> = commands(&journal)
        .into_iter()
        .filter(|(_, command)| matches!(command, Command::PortEnable(_)))
        .collect();
    assert_eq!(
        enables,
        vec![
            (Role::Camera, Command::PortEnable(71)),
            (Role::Splitter, Command::PortEnable(250)),
            (Role::Camera, Command::PortEnable(70)),
            (Role::NullSink, Command::PortEnable(240)),
            (Role::Splitter, Command::PortEnable(251)),
            (Role::Encoder, Command::PortEnable(340)),
            (Role::Encoder, Command::PortEnable(341)),
        ]
    );

    let states: Vec<_> = commands(&journal)
        .into_iter()
        .filter_map(|(role, command)| match command {
            Command::StateSet(state) => Some((role, state)),
            _ => None,
        })
        .collect();
    let mut expected: Vec<_> = Role::ALL
        .into_iter()
        .map(|role| (role, ComponentState::Idle))
        .collect();
    expected.extend(Role::ALL.into_iter().map(|role| (role, ComponentState::Executing)));
    assert_eq!(states, expected);

    pipeline.close().unwrap();
}

#[test]
fn camera_driver_is_loaded_before_it_is_configured() {
    let (simulator, mut pipeline) = open_pipeline();
    let journal = simulator.journal();

    let callback = position(&journal, |call| {
        matches!(
            call,
            Call::SetConfig {
                component: Role::Camera,
                config: Config::RequestCallback { .. }
            }
        )
    });
    let device = position(&journal, |call| {
        matches!(
            call,
            Call::SetParameter {
                component: Role::Camera,
                parameter: Parameter::CameraDeviceNumber { device: 0, .. }
            }
        )
    });
    let first_port_definition = position(&journal, |call| {
        matches!(
            call,
            Call::SetPortDefinition {
                component: Role::Camera,
                ..
            }
        )
    });
    assert!(callback < device && device < first_port_definition);
    pipeline.close().unwrap();
}

#[test]
fn shoot_steps_the_splitter_and_toggles_capture() {
    let (simulator, mut pipeline) = open_pipeline();
    simulator.clear_journal();
    simulator.queue_images(3, 128);
    pipeline.shoot(3, &mut FrameCollector::new()).unwrap();

    let configs: Vec<_> = simulator
        .journal()
        .into_iter()
        .filter_map(|call| match call {
            Call::SetConfig { component, config } => Some((component, config)),
            _ => None,
        })
        .collect();
    assert_eq!(
        configs,
        vec![
            (
                Role::Splitter,
                Config::SingleStep {
                    port: SPLITTER_OUTPUT,
                    steps: 3
                }
            ),
            (
                Role::Camera,
                Config::PortCapturing {
                    port: CAMERA_CAPTURE,
                    capturing: true
                }
            ),
            (
                Role::Camera,
                Config::PortCapturing {
                    port: CAMERA_CAPTURE,
                    capturing: false
                }
            ),
        ]
    );
    pipeline.close().unwrap();
}

#[test]
fn manual_white_balance_sends_gains() {
    let simulator = Simulator::new();
    let mut pipeline = StillPipeline::new(simulator.clone());
    let config = CaptureConfig {
        white_balance: WhiteBalance::Off,
        red_gain: 1500,
        blue_gain: 500,
        ..CaptureConfig::default()
    };
    pipeline.open(&config).unwrap();
    pipeline.close().unwrap();

    let gains: Vec<_> = simulator
        .journal()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                Call::SetConfig {
                    config: Config::WhiteBalanceGains { .. },
                    ..
                }
            )
        })
        .collect();
    assert_eq!(
        gains,
        vec![Call::SetConfig {
            component: Role::Camera,
            config: Config::WhiteBalanceGains {
                red_q16: 98304,
                blue_q16: 32768,
            },
        }]
    );
}

#[test]
fn automatic_white_balance_sends_no_gains() {
    let (simulator, mut pipeline) = open_pipeline();
    pipeline.close().unwrap();
    assert!(!simulator.journal().iter().any(|call| matches!(
        call,
        Call::SetConfig {
            config: Config::WhiteBalanceGains { .. },
            ..
        }
    )));
}

#[test]
fn invalid_config_is_rejected_before_any_call() {
    let simulator = Simulator::new();
    let mut pipeline = StillPipeline::new(simulator.clone());
    let config = CaptureConfig {
        quality: 0,
        ..CaptureConfig::default()
    };

    assert!(matches!(pipeline.open(&config), Err(Error::InvalidConfig(_))));
    assert_eq!(pipeline.stage(), PipelineStage::Closed);
    assert!(simulator.journal().is_empty());
}

#[test]
fn oversized_frame_is_rejected_before_any_call() {
    let simulator = Simulator::new();
    let mut pipeline = StillPipeline::new(simulator.clone());
    for (width, height) in [(u32::MAX - 1, 3280), (100_000, 100_000)] {
        let mut config = CaptureConfig::default();
        config.sensor.width = width;
        config.sensor.height = height;

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert!(matches!(pipeline.open(&config), Err(Error::InvalidConfig(_))));
    }
    assert_eq!(pipeline.stage(), PipelineStage::Closed);
    assert!(simulator.journal().is_empty());
}

#[test]
#[traced_test]
fn open_writes_aligned_port_formats() {
    let simulator = Simulator::new();
    let mut pipeline = StillPipeline::new(simulator.clone());
    let mut config = CaptureConfig::default();
    config.sensor.width = 1000;
    config.sensor.height = 1000;
    pipeline.open(&config).unwrap();

    let preview = video_format(&simulator, Role::Camera, CAMERA_PREVIEW);
    let capture = video_format(&simulator, Role::Camera, CAMERA_CAPTURE);
    let splitter = video_format(&simulator, Role::Splitter, SPLITTER_OUTPUT);
    for video in [&preview, &capture, &splitter] {
        assert_eq!((video.frame_width, video.frame_height), (1000, 1000));
        assert_eq!(video.stride, 1024);
        assert_eq!(video.slice_height, 1008);
        assert_eq!(video.color, ColorFormat::Yuv420PackedPlanar);
    }
    // The preview runs unthrottled, the capture port at the sensor rate.
    assert_eq!(preview.framerate, 0);
    assert_eq!(capture.framerate, 15 << 16);

    match simulator
        .port_definition_of(Role::Encoder, ENCODER_OUTPUT)
        .unwrap()
        .format
    {
        PortFormat::Image(image) => {
            assert_eq!((image.frame_width, image.frame_height), (1000, 1000));
            assert_eq!(image.slice_height, 1008);
            assert_eq!(image.compression, ImageCoding::Jpeg);
            assert_eq!(image.color, ColorFormat::Unused);
        }
        other => panic!("encoder output has format {other:?}"),
    }

    let journal = simulator.journal();
    for port in [CAMERA_PREVIEW, CAMERA_CAPTURE] {
        assert!(journal.contains(&Call::SetParameter {
            component: Role::Camera,
            parameter: Parameter::MaxFrameSize {
                port,
                width: 1024,
                height: 1008,
            },
        }));
    }
    assert!(journal.contains(&Call::SetParameter {
        component: Role::Splitter,
        parameter: Parameter::DisableProprietaryTunnels {
            port: SPLITTER_OUTPUT,
            use_buffers: false,
        },
    }));

    assert!(logs_contain("frame size"));
    assert!(logs_contain("port=72"));
    pipeline.close().unwrap();
}

#[test]
fn close_releases_in_reverse_of_open() {
    let (simulator, mut pipeline) = open_pipeline();
    simulator.clear_journal();
    pipeline.close().unwrap();

    let journal = simulator.journal();
    let mut expected: Vec<_> = Role::ALL
        .into_iter()
        .map(|role| (role, Command::StateSet(ComponentState::Idle)))
        .collect();
    expected.extend([
        (Role::Camera, Command::PortDisable(71)),
        (Role::Splitter, Command::PortDisable(250)),
        (Role::Camera, Command::PortDisable(70)),
        (Role::NullSink, Command::PortDisable(240)),
        (Role::Splitter, Command::PortDisable(251)),
        (Role::Encoder, Command::PortDisable(340)),
        (Role::Encoder, Command::PortDisable(341)),
    ]);
    expected.extend(
        Role::ALL
            .into_iter()
            .map(|role| (role, Command::StateSet(ComponentState::Loaded))),
    );
    assert_eq!(commands(&journal), expected);

    // The output buffer goes between its port disable and the first Loaded transition.
    let port_disable = position(&journal, |call| {
        matches!(
            call,
            Call::SendCommand {
                command: Command::PortDisable(341),
                ..
            }
        )
    });
    let free = position(&journal, |call| {
        matches!(
            call,
            Call::FreeBuffer {
                component: Role::Encoder,
                port: 341
            }
        )
    });
    let loaded = position(&journal, |call| {
        matches!(
            call,
            Call::SendCommand {
                command: Command::StateSet(ComponentState::Loaded),
                ..
            }
        )
    });
    assert!(port_disable < free && free < loaded);

    let destroyed: Vec<_> = journal
        .iter()
        .filter_map(|call| match call {
            Call::DestroyComponent(role) => Some(*role),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed, Role::ALL.to_vec());
    assert_eq!(journal.last(), Some(&Call::Deinit));
    assert!(simulator.report().is_clean());
}

#[test]
fn rejected_call_stops_open_at_that_step() {
    let simulator = Simulator::new();
    simulator.fail_on(Operation::SetupTunnel, 2, status::PORTS_NOT_COMPATIBLE);
    let mut pipeline = StillPipeline::new(simulator.clone());

    assert!(matches!(
        pipeline.open(&CaptureConfig::default()),
        Err(Error::PortsNotCompatible)
    ));
    assert_eq!(pipeline.stage(), PipelineStage::Partial);

    // Nothing was attempted after the failing call.
    let journal = simulator.journal();
    assert!(matches!(
        journal.last(),
        Some(Call::SetupTunnel {
            output: (Role::Splitter, 251),
            ..
        })
    ));
    assert_eq!(simulator.component_state(Role::Camera), Some(ComponentState::Loaded));

    assert!(matches!(
        pipeline.shoot(1, &mut FrameCollector::new()),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        pipeline.open(&CaptureConfig::default()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
#[traced_test]
fn close_after_failed_init_stops_at_the_first_missing_component() {
    let simulator = Simulator::new();
    simulator.fail_on(Operation::Init, 1, status::INSUFFICIENT_RESOURCES);
    let mut pipeline = StillPipeline::new(simulator.clone());

    assert!(matches!(
        pipeline.open(&CaptureConfig::default()),
        Err(Error::InsufficientResources)
    ));
    assert!(matches!(
        pipeline.close(),
        Err(Error::NotInitialized(Role::Camera))
    ));
    assert!(logs_contain("closing a partially initialized pipeline"));
    assert_eq!(pipeline.stage(), PipelineStage::Partial);

    drop(pipeline);
    assert!(logs_contain("pipeline released without a successful close"));
}

#[test]
fn close_after_partial_open_fails_without_cleaning_up() {
    let simulator = Simulator::new();
    simulator.fail_on(Operation::SetupTunnel, 3, status::PORTS_NOT_COMPATIBLE);
    let mut pipeline = StillPipeline::new(simulator.clone());
    assert!(pipeline.open(&CaptureConfig::default()).is_err());

    // The tunnel ports were never enabled, so disabling them is refused.
    assert!(matches!(
        pipeline.close(),
        Err(Error::IncorrectStateOperation)
    ));
    assert!(!simulator.report().is_clean());
}

#[test]
#[traced_test]
fn error_event_during_burst_aborts_the_shot() {
    let (simulator, mut pipeline) = open_pipeline();
    simulator.queue_images(1, 64);
    simulator.raise_error_after(Operation::FillBuffer, 2, status::HARDWARE);

    let mut chunks = 0;
    let result = pipeline.shoot(1, &mut |_frame: u32, _chunk: &[u8]| chunks += 1);
    match result {
        Err(Error::ComponentEvent { component, code }) => {
            assert_eq!(component, "encoder");
            assert_eq!(code, status::HARDWARE);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // The chunk delivered before the error stays delivered.
    assert_eq!(chunks, 1);
    assert_eq!(pipeline.stage(), PipelineStage::Partial);
    assert!(matches!(
        pipeline.shoot(1, &mut FrameCollector::new()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn error_event_during_open_is_reported_by_the_next_wait() {
    let simulator = Simulator::new();
    // The first command is the camera disabling its first port.
    simulator.raise_error_after(Operation::SendCommand, 1, status::INSUFFICIENT_RESOURCES);
    let mut pipeline = StillPipeline::new(simulator.clone());

    match pipeline.open(&CaptureConfig::default()) {
        Err(Error::ComponentEvent { component, code }) => {
            assert_eq!(component, "camera");
            assert_eq!(code, status::INSUFFICIENT_RESOURCES);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn lifecycle_misuse_is_rejected() {
    let simulator = Simulator::new();
    let mut pipeline = StillPipeline::new(simulator.clone());

    assert!(matches!(
        pipeline.shoot(1, &mut FrameCollector::new()),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(pipeline.close(), Err(Error::InvalidState(_))));

    pipeline.open(&CaptureConfig::default()).unwrap();
    assert!(matches!(
        pipeline.open(&CaptureConfig::default()),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        pipeline.shoot(0, &mut FrameCollector::new()),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(pipeline.stage(), PipelineStage::Executing);

    pipeline.close().unwrap();
    assert!(matches!(pipeline.close(), Err(Error::InvalidState(_))));
    assert!(simulator.report().is_clean());
}
