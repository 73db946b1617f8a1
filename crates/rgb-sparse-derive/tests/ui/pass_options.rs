//! Every supported combination of component options.

use rgb_sparse::Component;

#[derive(Component)]
struct Plain {
    value: u64,
}

#[derive(Component)]
struct Tag;

#[derive(Component)]
#[component(in_place)]
struct Stable(u32);

#[derive(Component)]
#[component(page_size = 64)]
struct Paged([u8; 4]);

#[derive(Component)]
#[component(empty)]
struct Flag;

#[derive(Component)]
#[component(in_place)]
#[component(page_size = 1 << 4)]
struct Split(i16);

fn main() {
    assert_eq!(<Stable as Component>::PAGE_SIZE, rgb_sparse::PACKED_PAGE);
    assert_eq!(<Paged as Component>::PAGE_SIZE, 64);
    assert_eq!(<Split as Component>::PAGE_SIZE, 16);
    assert_eq!(<Flag as Component>::PAGE_SIZE, 0);
    assert_eq!(<Tag as Component>::PAGE_SIZE, 0);
    let _ = Plain { value: 1 }.value;
}
