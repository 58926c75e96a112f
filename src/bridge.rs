// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the pickplace::MotionBridge type.

use std::convert::TryFrom;
use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::bridge::service_types::{
    AddBoxRequest, BridgeCommandEnum, CartesianPathRequest, CartesianPathResponse,
    ConnectRequest, ConnectResponse, DisplayTrajectoryRequest, ExecuteTrajectoryRequest,
    JointStateIntern, KnownObjectsResponse, PlannerSettingsRequest, PoseIntern,
    RemoveObjectRequest, Request, Response, Status, BRIDGE_VERSION,
};
use crate::exception::{PickPlaceException, PickPlaceResult};
use crate::executor::{TrajectoryDisplay, TrajectoryExecution};
use crate::gripper::{JointCommandSink, JointState, JointStateSource};
use crate::network::Network;
use crate::planner::{CartesianPlanner, PlanResult, PlannerSettings, TrajectoryHandle};
use crate::pose::{Pose, PoseSource, WaypointSequence};
use crate::scene::{PlanningScene, SceneObject};
use crate::shutdown::ShutdownFlag;

pub mod service_types;

pub use service_types::COMMAND_PORT;

/// Maintains a network connection to the motion bridge which fronts planning, execution,
/// visualization, the planning scene and the joint state stream of the robot.
pub struct MotionBridge {
    network: Network,
    bridge_version: u16,
    planning_frame: String,
    end_effector_link: String,
    joint_command_id: u64,
}

impl MotionBridge {
    /// Establishes a connection with the motion bridge.
    /// # Arguments
    /// * `bridge_address` - IP/hostname of the bridge.
    /// * `port` - TCP command port of the bridge, usually [`COMMAND_PORT`].
    /// * `joint_state_timeout` - Longest wait for a joint state.
    /// * `shutdown` - Flag aborting blocking waits.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the connection is lost, e.g. after a timeout.
    /// * [`IncompatibleLibraryVersionError`](`crate::exception::PickPlaceException::IncompatibleLibraryVersionError`) if the bridge does not support this version of pick-place-rs.
    pub fn new(
        bridge_address: &str,
        port: u16,
        joint_state_timeout: Duration,
        shutdown: ShutdownFlag,
    ) -> PickPlaceResult<MotionBridge> {
        let network = Network::new(bridge_address, port, joint_state_timeout, shutdown)?;
        let mut bridge = MotionBridge {
            network,
            bridge_version: 0,
            planning_frame: String::new(),
            end_effector_link: String::new(),
            joint_command_id: 0,
        };
        bridge.connect_bridge(BRIDGE_VERSION)?;
        Ok(bridge)
    }

    fn connect_bridge(&mut self, library_version: u16) -> PickPlaceResult<()> {
        let udp_port = self.network.get_udp_port();
        let response: Response<ConnectResponse> =
            self.send_command(BridgeCommandEnum::Connect, ConnectRequest::new(udp_port))?;
        match response.status {
            Status::Success => {
                let connect = response.response;
                self.bridge_version = connect.version;
                self.planning_frame = connect.planning_frame;
                self.end_effector_link = connect.end_effector_link;
                self.network.set_udp_bridge_port(connect.command_udp_port);
                info!(
                    "connected to motion bridge version {}, planning frame {}, end effector link {}",
                    self.bridge_version, self.planning_frame, self.end_effector_link
                );
                Ok(())
            }
            _ => Err(PickPlaceException::IncompatibleLibraryVersionError {
                server_version: response.response.version,
                library_version,
            }),
        }
    }

    fn send_command<Req, Res>(
        &mut self,
        command: BridgeCommandEnum,
        request: Req,
    ) -> PickPlaceResult<Response<Res>>
    where
        Req: Serialize + Debug,
        Res: DeserializeOwned + Debug,
    {
        let request = Request::new(command, self.network.next_command_id(), request)?;
        let command_id = self.network.tcp_send_request(&request)?;
        self.network.tcp_blocking_receive_response(command_id)
    }

    /// Returns the protocol version reported by the connected bridge.
    pub fn server_version(&self) -> u16 {
        self.bridge_version
    }

    /// Reference frame of all poses the bridge plans in.
    pub fn planning_frame(&self) -> &str {
        &self.planning_frame
    }

    /// Link whose pose is reported and planned for.
    pub fn end_effector_link(&self) -> &str {
        &self.end_effector_link
    }
}

fn handle_response_status(status: &Status, command: BridgeCommandEnum) -> PickPlaceResult<()> {
    match status {
        Status::Success => Ok(()),
        Status::Fail => Err(PickPlaceException::CommandException {
            message: format!("pick-place-rs bridge: {:?} failed!", command),
        }),
        Status::Rejected => Err(PickPlaceException::CommandException {
            message: format!("pick-place-rs bridge: {:?} rejected!", command),
        }),
        Status::Aborted => Err(PickPlaceException::CommandException {
            message: format!("pick-place-rs bridge: {:?} aborted!", command),
        }),
    }
}

impl PoseSource for MotionBridge {
    fn current_pose(&mut self) -> PickPlaceResult<Pose> {
        let response: Response<PoseIntern> =
            self.send_command(BridgeCommandEnum::GetCurrentPose, ())?;
        handle_response_status(&response.status, BridgeCommandEnum::GetCurrentPose)?;
        Ok(response.response.into())
    }
}

impl CartesianPlanner for MotionBridge {
    fn configure(&mut self, settings: &PlannerSettings) -> PickPlaceResult<()> {
        let request = PlannerSettingsRequest {
            goal_tolerance: settings.goal_tolerance,
            orientation_tolerance: settings.orientation_tolerance,
            joint_tolerance: settings.joint_tolerance,
            planning_attempts: settings.planning_attempts,
        };
        let response: Response<()> =
            self.send_command(BridgeCommandEnum::ConfigurePlanner, request)?;
        handle_response_status(&response.status, BridgeCommandEnum::ConfigurePlanner)
    }

    fn compute_cartesian_path(
        &mut self,
        waypoints: &WaypointSequence,
        max_step: f64,
        jump_threshold: f64,
    ) -> PickPlaceResult<PlanResult> {
        let request = CartesianPathRequest {
            waypoints: waypoints.iter().map(PoseIntern::from).collect(),
            max_step,
            jump_threshold,
        };
        let response: Response<CartesianPathResponse> =
            self.send_command(BridgeCommandEnum::ComputeCartesianPath, request)?;
        handle_response_status(&response.status, BridgeCommandEnum::ComputeCartesianPath)?;
        Ok(PlanResult {
            trajectory: TrajectoryHandle(response.response.trajectory_id),
            fraction: response.response.fraction,
        })
    }
}

impl TrajectoryDisplay for MotionBridge {
    fn display_trajectory(&mut self, trajectory: &TrajectoryHandle) -> PickPlaceResult<()> {
        let request = DisplayTrajectoryRequest {
            trajectory_id: trajectory.0,
        };
        let response: Response<()> =
            self.send_command(BridgeCommandEnum::DisplayTrajectory, request)?;
        handle_response_status(&response.status, BridgeCommandEnum::DisplayTrajectory)
    }
}

impl TrajectoryExecution for MotionBridge {
    fn execute_trajectory(
        &mut self,
        trajectory: &TrajectoryHandle,
        wait: bool,
    ) -> PickPlaceResult<bool> {
        let request = ExecuteTrajectoryRequest {
            trajectory_id: trajectory.0,
            wait,
        };
        let response: Response<()> =
            self.send_command(BridgeCommandEnum::ExecuteTrajectory, request)?;
        match response.status {
            Status::Success => Ok(true),
            Status::Fail | Status::Aborted => Ok(false),
            Status::Rejected => Err(PickPlaceException::CommandException {
                message: format!("pick-place-rs bridge: trajectory {} rejected!", trajectory.0),
            }),
        }
    }
}

impl JointStateSource for MotionBridge {
    fn wait_for_joint_state(&mut self) -> PickPlaceResult<JointState> {
        let state: JointStateIntern = self.network.udp_blocking_receive_latest()?;
        JointState::try_from(state)
    }
}

impl JointCommandSink for MotionBridge {
    fn publish_joint_command(&mut self, command: &JointState) -> PickPlaceResult<()> {
        self.joint_command_id += 1;
        let packet = JointStateIntern::from_joint_state(self.joint_command_id, command)?;
        self.network.udp_send(&packet)
    }
}

impl PlanningScene for MotionBridge {
    fn known_objects(&mut self) -> PickPlaceResult<Vec<String>> {
        let response: Response<KnownObjectsResponse> =
            self.send_command(BridgeCommandEnum::GetKnownObjects, ())?;
        handle_response_status(&response.status, BridgeCommandEnum::GetKnownObjects)?;
        Ok(response.response.names)
    }

    fn remove_object(&mut self, name: &str) -> PickPlaceResult<()> {
        let request = RemoveObjectRequest {
            name: name.to_string(),
        };
        let response: Response<()> =
            self.send_command(BridgeCommandEnum::RemoveObject, request)?;
        handle_response_status(&response.status, BridgeCommandEnum::RemoveObject)
    }

    fn add_box(&mut self, object: &SceneObject) -> PickPlaceResult<()> {
        debug!("adding box {} in frame {}", object.name, object.frame_id);
        let response: Response<()> =
            self.send_command(BridgeCommandEnum::AddBox, AddBoxRequest::from(object))?;
        handle_response_status(&response.status, BridgeCommandEnum::AddBox)
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::service_types::{
        BridgeCommandEnum, BridgeCommandHeader, CartesianPathRequest, CartesianPathResponse,
        ConnectRequest, ConnectResponse, ExecuteTrajectoryRequest, JointStateIntern,
        PlannerSettingsRequest, PoseIntern, Request, Response, Status, BRIDGE_VERSION, MAX_JOINTS,
    };
    use crate::bridge::MotionBridge;
    use crate::exception::PickPlaceException;
    use crate::executor::TrajectoryExecution;
    use crate::gripper::{JointCommandSink, JointState, JointStateSource};
    use crate::network::HEADER_SIZE;
    use crate::planner::{CartesianPlanner, PlannerSettings, TrajectoryHandle};
    use crate::pose::{Pose, PoseSource, WaypointSequence};
    use crate::shutdown::ShutdownFlag;
    use bincode::{deserialize, serialize};
    use mockall::automock;
    use std::convert::TryFrom;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream, UdpSocket};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub struct ServerReaction {}

    #[automock]
    #[allow(unused)]
    impl ServerReaction {
        fn process_received_bytes(&self, bytes: &mut Vec<u8>) -> Vec<u8> {
            Vec::new()
        }
        fn number_of_reactions(&self) -> usize {
            0
        }
    }

    struct BridgeMockServer {
        server_version: u16,
        udp_socket: UdpSocket,
    }

    impl BridgeMockServer {
        pub fn new(server_version: u16) -> Self {
            BridgeMockServer {
                server_version,
                udp_socket: UdpSocket::bind("127.0.0.1:0").unwrap(),
            }
        }

        /// Answers the handshake and then one message per reaction. Returns the client's UDP port.
        pub fn serve(&self, listener: TcpListener, reaction: &mut MockServerReaction) -> u16 {
            let (mut tcp_socket, _remote_address) = listener.accept().unwrap();
            tcp_socket.set_nodelay(true).unwrap();
            let request: Request<ConnectRequest> =
                deserialize(&receive_message(&mut tcp_socket)).unwrap();
            let udp_port = request.request.udp_port;
            self.send_connect_response(&request, &mut tcp_socket);
            for _ in 0..reaction.number_of_reactions() {
                let mut bytes = receive_message(&mut tcp_socket);
                let response = reaction.process_received_bytes(&mut bytes);
                tcp_socket.write_all(&response).unwrap();
            }
            udp_port
        }

        fn send_connect_response(
            &self,
            request: &Request<ConnectRequest>,
            tcp_socket: &mut TcpStream,
        ) {
            let response = Response::new(
                BridgeCommandEnum::Connect,
                request.header.command_id,
                match self.server_version == request.request.version {
                    true => Status::Success,
                    false => Status::Fail,
                },
                ConnectResponse {
                    version: self.server_version,
                    command_udp_port: self.udp_socket.local_addr().unwrap().port(),
                    planning_frame: "robot_base".to_string(),
                    end_effector_link: "hand".to_string(),
                },
            )
            .unwrap();
            tcp_socket.write_all(&serialize(&response).unwrap()).unwrap();
        }
    }

    fn receive_message(tcp_socket: &mut TcpStream) -> Vec<u8> {
        let mut bytes = vec![0_u8; HEADER_SIZE];
        tcp_socket.read_exact(&mut bytes).unwrap();
        let header: BridgeCommandHeader = deserialize(&bytes).unwrap();
        bytes.resize(header.size as usize, 0);
        tcp_socket.read_exact(&mut bytes[HEADER_SIZE..]).unwrap();
        bytes
    }

    fn status_response(bytes: &[u8], status: Status) -> Vec<u8> {
        let header: BridgeCommandHeader = deserialize(bytes).unwrap();
        serialize(&Response::new(header.command, header.command_id, status, ()).unwrap()).unwrap()
    }

    fn listen() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn connect(port: u16) -> MotionBridge {
        MotionBridge::new(
            "127.0.0.1",
            port,
            Duration::from_secs(1),
            ShutdownFlag::new(),
        )
        .expect("bridge failure")
    }

    #[test]
    fn handshake_and_pose_query() {
        let (listener, port) = listen();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION);
            let mut mock = MockServerReaction::default();
            mock.expect_process_received_bytes()
                .returning(|bytes: &mut Vec<u8>| -> Vec<u8> {
                    let request: Request<()> = deserialize(bytes).unwrap();
                    assert_eq!(request.header.command, BridgeCommandEnum::GetCurrentPose);
                    let response = Response::new(
                        BridgeCommandEnum::GetCurrentPose,
                        request.header.command_id,
                        Status::Success,
                        PoseIntern {
                            position: [0.3, 0.1, 1.2],
                            orientation: [0., 0., 0., 1.],
                        },
                    )
                    .unwrap();
                    serialize(&response).unwrap()
                })
                .times(1);
            mock.expect_number_of_reactions().return_const(1_usize);
            server.serve(listener, &mut mock);
        });
        {
            let mut bridge = connect(port);
            assert_eq!(bridge.server_version(), BRIDGE_VERSION);
            assert_eq!(bridge.planning_frame(), "robot_base");
            assert_eq!(bridge.end_effector_link(), "hand");
            let pose = bridge.current_pose().unwrap();
            assert_eq!(pose.position.z, 1.2);
        }
        thread.join().unwrap();
    }

    #[test]
    fn incompatible_version() {
        let (listener, port) = listen();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION + 1);
            let mut mock = MockServerReaction::default();
            mock.expect_number_of_reactions().return_const(0_usize);
            server.serve(listener, &mut mock);
        });
        match MotionBridge::new("127.0.0.1", port, Duration::from_secs(1), ShutdownFlag::new()) {
            Err(PickPlaceException::IncompatibleLibraryVersionError {
                server_version,
                library_version,
            }) => {
                assert_eq!(server_version, BRIDGE_VERSION + 1);
                assert_eq!(library_version, BRIDGE_VERSION);
            }
            Err(e) => panic!("expected version error but found {}", e),
            Ok(_) => panic!("expected version error"),
        }
        thread.join().unwrap();
    }

    #[test]
    fn cartesian_path_and_execution() {
        let (listener, port) = listen();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION);
            let mut mock = MockServerReaction::default();
            let mut counter = 0;
            mock.expect_process_received_bytes()
                .returning(move |bytes: &mut Vec<u8>| -> Vec<u8> {
                    counter += 1;
                    match counter {
                        1 => {
                            let request: Request<CartesianPathRequest> =
                                deserialize(bytes).unwrap();
                            assert_eq!(
                                request.header.command,
                                BridgeCommandEnum::ComputeCartesianPath
                            );
                            assert_eq!(request.request.waypoints.len(), 3);
                            assert_eq!(request.request.waypoints[2].position[2], 0.9);
                            assert_eq!(request.request.max_step, 0.01);
                            assert_eq!(request.request.jump_threshold, 0.);
                            let response = Response::new(
                                BridgeCommandEnum::ComputeCartesianPath,
                                request.header.command_id,
                                Status::Success,
                                CartesianPathResponse {
                                    trajectory_id: 7,
                                    fraction: 0.8,
                                },
                            )
                            .unwrap();
                            serialize(&response).unwrap()
                        }
                        2 => {
                            let request: Request<ExecuteTrajectoryRequest> =
                                deserialize(bytes).unwrap();
                            assert_eq!(request.request.trajectory_id, 7);
                            assert!(request.request.wait);
                            status_response(bytes, Status::Success)
                        }
                        _ => status_response(bytes, Status::Aborted),
                    }
                })
                .times(3);
            mock.expect_number_of_reactions().return_const(3_usize);
            server.serve(listener, &mut mock);
        });
        {
            let mut bridge = connect(port);
            let start = Pose::default();
            let waypoints = WaypointSequence::new(
                start,
                vec![start.with_z(0.8), start.with_z(0.9)],
            )
            .unwrap();
            let plan = bridge
                .compute_cartesian_path(&waypoints, 0.01, 0.)
                .unwrap();
            assert_eq!(plan.trajectory, TrajectoryHandle(7));
            assert_eq!(plan.fraction, 0.8);
            assert!(bridge.execute_trajectory(&plan.trajectory, true).unwrap());
            assert!(!bridge.execute_trajectory(&plan.trajectory, true).unwrap());
        }
        thread.join().unwrap();
    }

    #[test]
    fn failed_configuration_is_a_command_exception() {
        let (listener, port) = listen();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION);
            let mut mock = MockServerReaction::default();
            mock.expect_process_received_bytes()
                .returning(|bytes: &mut Vec<u8>| status_response(bytes, Status::Rejected))
                .times(1);
            mock.expect_number_of_reactions().return_const(1_usize);
            server.serve(listener, &mut mock);
        });
        {
            let mut bridge = connect(port);
            match bridge.configure(&Default::default()) {
                Err(PickPlaceException::CommandException { .. }) => {}
                other => panic!("expected command exception but found {:?}", other),
            }
        }
        thread.join().unwrap();
    }

    #[test]
    fn planner_settings_reach_the_bridge() {
        let (listener, port) = listen();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION);
            let mut mock = MockServerReaction::default();
            mock.expect_process_received_bytes()
                .returning(|bytes: &mut Vec<u8>| -> Vec<u8> {
                    let request: Request<PlannerSettingsRequest> = deserialize(bytes).unwrap();
                    assert_eq!(request.header.command, BridgeCommandEnum::ConfigurePlanner);
                    assert_eq!(request.header.size as usize, bytes.len());
                    assert_eq!(request.request.goal_tolerance, 0.01);
                    assert_eq!(request.request.orientation_tolerance, 0.01);
                    assert_eq!(request.request.joint_tolerance, 0.01);
                    assert_eq!(request.request.planning_attempts, 100);
                    status_response(bytes, Status::Success)
                })
                .times(1);
            mock.expect_number_of_reactions().return_const(1_usize);
            server.serve(listener, &mut mock);
        });
        {
            let mut bridge = connect(port);
            bridge.configure(&PlannerSettings::default()).unwrap();
        }
        thread.join().unwrap();
    }

    #[test]
    fn oversized_joint_state_is_a_network_exception() {
        let (listener, port) = listen();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION);
            let mut mock = MockServerReaction::default();
            mock.expect_number_of_reactions().return_const(0_usize);
            let client_udp_port = server.serve(listener, &mut mock);
            let state_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            let bytes = serialize(&JointStateIntern {
                message_id: 1,
                stamp_nanos: 1_000_000,
                len: MAX_JOINTS as u32 + 4,
                position: [0.5; MAX_JOINTS],
            })
            .unwrap();
            for _ in 0..20 {
                let _ = state_socket.send_to(&bytes, ("127.0.0.1", client_udp_port));
                std::thread::sleep(Duration::from_millis(10));
            }
        });
        {
            let mut bridge = connect(port);
            match bridge.wait_for_joint_state() {
                Err(PickPlaceException::NetworkException { message }) => {
                    assert!(message.contains("20 joints"), "{}", message)
                }
                other => panic!("expected network exception but found {:?}", other),
            }
        }
        thread.join().unwrap();
    }

    #[test]
    fn joint_state_and_command() {
        let (listener, port) = listen();
        let (udp_port_sender, udp_port_receiver) = std::sync::mpsc::channel();
        let thread = std::thread::spawn(move || {
            let server = BridgeMockServer::new(BRIDGE_VERSION);
            let mut mock = MockServerReaction::default();
            mock.expect_number_of_reactions().return_const(0_usize);
            let client_udp_port = server.serve(listener, &mut mock);

            let streaming = Arc::new(AtomicBool::new(true));
            let streaming_thread = streaming.clone();
            let state_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            let state_thread = std::thread::spawn(move || {
                let mut counter = 1;
                while streaming_thread.load(Ordering::SeqCst) {
                    let mut position = [0.; MAX_JOINTS];
                    position[..4].copy_from_slice(&[0.1, 0.2, 0.0, 0.0]);
                    let bytes = serialize(&JointStateIntern {
                        message_id: counter,
                        stamp_nanos: counter * 1_000_000,
                        len: 4,
                        position,
                    })
                    .unwrap();
                    counter += 1;
                    let _ = state_socket.send_to(&bytes, ("127.0.0.1", client_udp_port));
                    std::thread::sleep(Duration::from_millis(10));
                }
            });

            server
                .udp_socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            let mut buffer = [0_u8; 1500];
            let (read_bytes, _) = server.udp_socket.recv_from(&mut buffer).unwrap();
            streaming.store(false, Ordering::SeqCst);
            state_thread.join().unwrap();
            let command: JointStateIntern = deserialize(&buffer[..read_bytes]).unwrap();
            udp_port_sender.send(command).unwrap();
        });
        {
            let mut bridge = connect(port);
            let state = bridge.wait_for_joint_state().unwrap();
            assert_eq!(state.position, vec![0.1, 0.2, 0.0, 0.0]);
            let command = state
                .with_trailing_positions(2, 0.7, Duration::from_secs(3))
                .unwrap();
            bridge.publish_joint_command(&command).unwrap();
        }
        thread.join().unwrap();
        let command = udp_port_receiver.recv().unwrap();
        assert_eq!(command.len, 4);
        assert_eq!(&command.position[..4], &[0.1, 0.2, 0.7, 0.7]);
        assert_eq!(command.stamp_nanos, 3_000_000_000);
        assert_eq!(JointState::try_from(command).unwrap().position.len(), 4);
    }
}
