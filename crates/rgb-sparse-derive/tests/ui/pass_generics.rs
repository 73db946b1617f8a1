//! Generic and enum components.

use rgb_sparse::{Component, Entity};

#[derive(Component)]
struct Handle<T> {
    target: Entity,
    payload: T,
}

#[derive(Component)]
#[component(in_place)]
struct Bounded<T: Copy>(T);

#[derive(Component, Clone, Copy)]
enum Direction {
    North,
    South,
    East,
    West,
}

fn assert_component<T: Component>() {}

fn main() {
    assert_component::<Handle<String>>();
    assert_component::<Bounded<u8>>();
    assert_component::<Direction>();
    assert!(<Bounded<u8> as Component>::IN_PLACE_DELETE);
}
