// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Tunnel and component primitives, driven directly against the simulator.

use omx_still::{
    Component, ComponentState, Error, EventFlags, Role, Tunnel,
    backend::Backend,
    port::{CAMERA_CAPTURE, SPLITTER_INPUT},
    sim::Simulator,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Initializes logging and returns a simulator with the camera and splitter
/// created, tunneled and in `Idle`.
fn setup_test() -> (Simulator, Component<Simulator>, Component<Simulator>) {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });

    let mut simulator = Simulator::new();
    simulator.init().unwrap();
    let mut camera = Component::create(&mut simulator, Role::Camera).unwrap();
    let mut splitter = Component::create(&mut simulator, Role::Splitter).unwrap();

    Tunnel::VIDEO.setup(&mut simulator, &camera, &splitter).unwrap();
    splitter.wait(EventFlags::PORT_SETTINGS_CHANGED).unwrap();

    camera.change_state(&mut simulator, ComponentState::Idle).unwrap();
    splitter.change_state(&mut simulator, ComponentState::Idle).unwrap();
    (simulator, camera, splitter)
}

fn teardown(mut simulator: Simulator, mut camera: Component<Simulator>, mut splitter: Component<Simulator>) {
    camera.change_state(&mut simulator, ComponentState::Loaded).unwrap();
    splitter.change_state(&mut simulator, ComponentState::Loaded).unwrap();
    camera.destroy(&mut simulator).unwrap();
    splitter.destroy(&mut simulator).unwrap();
    simulator.deinit().unwrap();
    assert!(simulator.report().is_clean());
}

#[test]
fn created_components_start_with_every_port_disabled() {
    let (simulator, camera, splitter) = setup_test();
    let report = simulator.report();
    assert!(report.enabled_ports.is_empty());
    assert_eq!(camera.state(), ComponentState::Idle);
    assert_eq!(
        simulator.component_state(Role::Splitter),
        Some(ComponentState::Idle)
    );
    teardown(simulator, camera, splitter);
}

#[test]
fn tunnel_enable_and_disable_confirm_both_ends() {
    let (mut simulator, camera, splitter) = setup_test();

    Tunnel::VIDEO.enable(&mut simulator, &camera, &splitter).unwrap();
    let report = simulator.report();
    assert!(report.enabled_ports.contains(&(Role::Camera, CAMERA_CAPTURE)));
    assert!(report.enabled_ports.contains(&(Role::Splitter, SPLITTER_INPUT)));
    assert!(camera.events().pending().unwrap().is_empty());
    assert!(splitter.events().pending().unwrap().is_empty());

    Tunnel::VIDEO.disable(&mut simulator, &camera, &splitter).unwrap();
    assert!(simulator.report().enabled_ports.is_empty());
    teardown(simulator, camera, splitter);
}

#[test]
fn tunneled_port_completes_only_once_its_peer_follows() {
    let (mut simulator, camera, splitter) = setup_test();

    camera.enable_port(&mut simulator, CAMERA_CAPTURE).unwrap();
    assert!(
        !camera
            .events()
            .pending()
            .unwrap()
            .contains(EventFlags::PORT_ENABLE)
    );

    // Waiting on the input end first works as well.
    splitter.enable_port(&mut simulator, SPLITTER_INPUT).unwrap();
    splitter.wait(EventFlags::PORT_ENABLE).unwrap();
    camera.wait(EventFlags::PORT_ENABLE).unwrap();

    Tunnel::VIDEO.disable(&mut simulator, &camera, &splitter).unwrap();
    teardown(simulator, camera, splitter);
}

#[test]
fn tunnel_rejects_components_in_the_wrong_roles() {
    let (mut simulator, camera, splitter) = setup_test();

    assert!(matches!(
        Tunnel::VIDEO.enable(&mut simulator, &splitter, &camera),
        Err(Error::Other(_))
    ));
    assert!(matches!(
        Tunnel::PREVIEW.enable(&mut simulator, &camera, &splitter),
        Err(Error::Other(_))
    ));
    // Nothing was sent.
    assert!(simulator.report().enabled_ports.is_empty());
    teardown(simulator, camera, splitter);
}

#[test]
fn state_changes_must_be_adjacent() {
    let (mut simulator, mut camera, splitter) = setup_test();

    camera
        .change_state(&mut simulator, ComponentState::Executing)
        .unwrap();
    assert!(matches!(
        camera.change_state(&mut simulator, ComponentState::Loaded),
        Err(Error::IncorrectStateTransition)
    ));
    assert_eq!(camera.state(), ComponentState::Executing);
    assert!(matches!(
        camera.change_state(&mut simulator, ComponentState::Executing),
        Err(Error::SameState)
    ));

    camera.change_state(&mut simulator, ComponentState::Idle).unwrap();
    teardown(simulator, camera, splitter);
}

#[test]
fn tunnel_display_names_both_ends() {
    assert_eq!(Tunnel::ENCODE.to_string(), "splitter:251 -> encoder:340");
}
