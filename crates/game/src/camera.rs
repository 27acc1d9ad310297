use glam::{Mat4, Vec3};
use grid_common::Transform;
use grid_input::{InputState, Key};

/// Starting eye position, looking down at the board.
pub const START_POSITION: Vec3 = Vec3::new(3.75, 5.0, 10.3);
/// Starting pitch in radians (negative looks down).
pub const START_PITCH: f32 = -0.75;
/// Distance moved per frame while a movement key is held.
pub const CAMERA_STEP: f32 = 0.05;

/// What the game needs from the window: a way to ask it to close.
pub trait WindowControl {
    fn request_close(&mut self);
}

/// Viewer state. Camera motion is per frame, not per second.
#[derive(Debug, Clone)]
pub struct GameState {
    pub camera: Transform,
    pub step: f32,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            camera: Transform {
                position: START_POSITION,
                rotation: Vec3::new(START_PITCH, 0.0, 0.0),
                ..Transform::default()
            },
            step: CAMERA_STEP,
        }
    }

    pub fn update(&mut self, input: &InputState, window: &mut impl WindowControl) {
        if input.key_pressed(Key::Escape) {
            tracing::info!("exit requested");
            window.request_close();
        }

        let position = &mut self.camera.position;
        if input.key_down(Key::A) {
            position.x -= self.step;
        }
        if input.key_down(Key::D) {
            position.x += self.step;
        }
        if input.key_down(Key::W) {
            position.z -= self.step;
        }
        if input.key_down(Key::S) {
            position.z += self.step;
        }
    }

    /// Inverse of the camera's world transform.
    pub fn view_matrix(&self) -> Mat4 {
        self.camera.to_mat4().inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct CloseFlag(bool);

    impl WindowControl for CloseFlag {
        fn request_close(&mut self) {
            self.0 = true;
        }
    }

    fn frame(game: &mut GameState, input: &mut InputState, keys: &[Key]) -> bool {
        let held: HashSet<Key> = keys.iter().copied().collect();
        let mut window = CloseFlag::default();
        input.update(&held);
        game.update(input, &mut window);
        window.0
    }

    #[test]
    fn starts_above_the_board_looking_down() {
        let game = GameState::new();
        assert_eq!(game.camera.position, START_POSITION);
        assert_eq!(game.camera.rotation.x, START_PITCH);
        let forward = game.camera.to_mat4().transform_vector3(Vec3::NEG_Z);
        assert!(forward.y < 0.0);
    }

    #[test]
    fn holding_forward_moves_exactly_n_steps() {
        let mut game = GameState::new();
        let mut input = InputState::new();
        let start = game.camera.position;
        let frames = 40;
        for _ in 0..frames {
            frame(&mut game, &mut input, &[Key::W]);
        }
        let moved = game.camera.position - start;
        let expected = -(frames as f32) * CAMERA_STEP;
        assert!((moved.z - expected).abs() < 1e-4, "moved {moved:?}");
        assert_eq!(moved.x, 0.0);
        assert_eq!(moved.y, 0.0);
    }

    #[test]
    fn strafe_and_back_move_on_their_axes() {
        let mut game = GameState::new();
        let mut input = InputState::new();
        let start = game.camera.position;
        frame(&mut game, &mut input, &[Key::D, Key::S]);
        let moved = game.camera.position - start;
        assert!((moved.x - CAMERA_STEP).abs() < 1e-6);
        assert!((moved.z - CAMERA_STEP).abs() < 1e-6);

        frame(&mut game, &mut input, &[Key::A, Key::D]);
        assert!((game.camera.position.x - (start.x + CAMERA_STEP)).abs() < 1e-5);
    }

    #[test]
    fn escape_requests_close_on_press_only() {
        let mut game = GameState::new();
        let mut input = InputState::new();
        assert!(!frame(&mut game, &mut input, &[]));
        assert!(frame(&mut game, &mut input, &[Key::Escape]));
        assert!(!frame(&mut game, &mut input, &[Key::Escape]));
    }

    #[test]
    fn view_matrix_inverts_camera_transform() {
        let mut game = GameState::new();
        let mut input = InputState::new();
        for _ in 0..7 {
            frame(&mut game, &mut input, &[Key::A, Key::W]);
        }
        let product = game.view_matrix() * game.camera.to_mat4();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }
}
