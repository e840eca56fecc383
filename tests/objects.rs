mod common;

use anyhow::Result;
use common::{Fault, MockHsds, connector, unique_domain};
use hsds_vol::{
    Attribute, AttributeGet, AttributeValue, CharSet, CommittedDatatype, CreateFlags, Dataset,
    DatasetGet, DatasetValue, Dataspace, Datatype, DatatypeGet, DatatypeValue, File, Group,
    Intent, Method, Object, ObjectKind, PlistId, RestError, StrLength,
};

fn new_file(conn: &hsds_vol::Connector) -> Result<File> {
    Ok(File::create(
        conn,
        &unique_domain(),
        CreateFlags::default(),
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?)
}

// ==========================================================================================
//  Datasets
// ==========================================================================================

#[test]
fn dataset_type_and_shape_come_back_on_open() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;

    let space = Dataspace::Simple {
        dims: vec![10, 20],
        maxdims: Some(vec![None, Some(20)]),
    };
    let created = Dataset::create(
        &file,
        Some("/dset"),
        &Datatype::native_f64(),
        &space,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?;
    assert_eq!(created.uri(), "d-1");
    assert_eq!(created.name(), Some("/dset"));

    let opened = Dataset::open(&file, "/dset", PlistId::DEFAULT)?;
    assert_eq!(opened.uri(), created.uri());
    assert_eq!(opened.datatype(), &Datatype::native_f64());
    assert_eq!(opened.get(DatasetGet::Space)?, DatasetValue::Space(space.clone()));
    assert_eq!(conn.cache().lookup(ObjectKind::Dataset, "d-1").map(|e| e.holders), Some(2));

    let DatasetValue::CreatePlist(dcpl) = opened.get(DatasetGet::CreatePlist)? else {
        panic!("expected a property list");
    };
    conn.plists().close(dcpl)?;

    opened.close()?;
    created.close()?;
    assert_eq!(conn.cache().len(ObjectKind::Dataset), 0);
    file.close()?;
    Ok(())
}

#[test]
fn scalar_and_null_spaces_round_trip() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;

    for (name, space) in [("/scalar", Dataspace::Scalar), ("/empty", Dataspace::Null)] {
        Dataset::create(
            &file,
            Some(name),
            &Datatype::native_i32(),
            &space,
            PlistId::DEFAULT,
            PlistId::DEFAULT,
            PlistId::DEFAULT,
        )?
        .close()?;
        let opened = Dataset::open(&file, name, PlistId::DEFAULT)?;
        assert_eq!(opened.dataspace(), &space);
        opened.close()?;
    }

    file.close()?;
    Ok(())
}

#[test]
fn relative_dataset_lookups_start_from_the_group() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;

    let group = Group::create(&file, Some("/g"), PlistId::DEFAULT, PlistId::DEFAULT, PlistId::DEFAULT)?;
    let dset = Dataset::create(
        &group,
        Some("values"),
        &Datatype::native_i32(),
        &Dataspace::simple(&[4]),
        PlistId::DEFAULT,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?;
    assert_eq!(dset.name(), Some("/g/values"));

    let opened = Dataset::open(&group, "values", PlistId::DEFAULT)?;
    assert_eq!(opened.uri(), dset.uri());
    assert!(
        mock.requests()
            .iter()
            .any(|r| r == "GET /datasets/"),
        "typed lookup goes through the dataset collection"
    );

    let by_kind = Object::open(&file, "/g/values")?;
    assert_eq!(by_kind.kind(), ObjectKind::Dataset);
    by_kind.close()?;

    opened.close()?;
    dset.close()?;
    group.close()?;
    file.close()?;
    Ok(())
}

#[test]
fn failing_dataset_fetch_unwinds_the_handle() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;
    Dataset::create(
        &file,
        Some("/dset"),
        &Datatype::native_i32(),
        &Dataspace::simple(&[3]),
        PlistId::DEFAULT,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?
    .close()?;

    let dapl = conn.plists().create(hsds_vol::PlistClass::DatasetAccess);
    let plists_before = conn.plists().live_count();
    mock.fail_once(Method::Get, "/datasets/d-1", Fault::Status(500));

    let err = Dataset::open(&file, "/dset", dapl).err().expect("fetch fails");
    assert!(matches!(err, RestError::Http { status: 500, .. }), "got {err:?}");
    assert_eq!(conn.cache().len(ObjectKind::Dataset), 0);
    assert_eq!(file.domain().ref_count(), 1);
    assert_eq!(conn.plists().live_count(), plists_before);

    conn.plists().close(dapl)?;
    file.close()?;
    Ok(())
}

// ==========================================================================================
//  Committed datatypes
// ==========================================================================================

#[test]
fn committed_datatypes_reopen_with_their_definition() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;

    let label = Datatype::String {
        length: StrLength::Fixed(12),
        charset: CharSet::Utf8,
    };
    let committed = CommittedDatatype::commit(
        &file,
        Some("/label_t"),
        &label,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?;
    assert_eq!(committed.uri(), "t-1");

    let opened = CommittedDatatype::open(&file, "/label_t", PlistId::DEFAULT)?;
    assert_eq!(opened.get(DatatypeGet::Type)?, DatatypeValue::Type(label));
    assert_eq!(conn.cache().len(ObjectKind::Datatype), 1);

    let obj = Object::open(&file, "label_t")?;
    assert_eq!(obj.kind(), ObjectKind::Datatype);
    obj.close()?;

    opened.close()?;
    committed.close()?;
    file.close()?;
    Ok(())
}

// ==========================================================================================
//  Attributes
// ==========================================================================================

#[test]
fn attributes_on_groups_and_datasets() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;
    let group = Group::create(&file, Some("/g"), PlistId::DEFAULT, PlistId::DEFAULT, PlistId::DEFAULT)?;

    let units = Datatype::String {
        length: StrLength::Variable,
        charset: CharSet::Ascii,
    };
    let attr = Attribute::create(&group, "units", &units, &Dataspace::Scalar, PlistId::DEFAULT, PlistId::DEFAULT)?;
    assert_eq!(attr.cache_key(), format!("{}/units", group.uri()));
    assert!(Attribute::exists(&group, "units")?);
    assert!(!Attribute::exists(&group, "missing")?);

    let opened = Attribute::open(&group, "units", PlistId::DEFAULT)?;
    assert_eq!(opened.get(AttributeGet::Type)?, AttributeValue::Type(units));
    assert_eq!(opened.get(AttributeGet::Space)?, AttributeValue::Space(Dataspace::Scalar));
    assert_eq!(opened.get(AttributeGet::Name)?, AttributeValue::Name("units".to_string()));
    assert!(opened.created().is_some());
    assert_eq!(
        conn.cache().lookup(ObjectKind::Attribute, attr.cache_key()).map(|e| e.holders),
        Some(2)
    );

    let dset = Dataset::create(
        &file,
        Some("/d"),
        &Datatype::native_i32(),
        &Dataspace::simple(&[2]),
        PlistId::DEFAULT,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?;
    Attribute::create(&dset, "scale", &Datatype::native_f64(), &Dataspace::simple(&[3]), PlistId::DEFAULT, PlistId::DEFAULT)?
        .close()?;
    Attribute::create(&dset, "offset", &Datatype::native_f64(), &Dataspace::Scalar, PlistId::DEFAULT, PlistId::DEFAULT)?
        .close()?;
    assert_eq!(Attribute::list_names(&dset)?, vec!["offset", "scale"]);

    let err = Attribute::create(&dset, "scale", &Datatype::native_f64(), &Dataspace::Scalar, PlistId::DEFAULT, PlistId::DEFAULT)
        .err()
        .expect("duplicate");
    assert!(matches!(err, RestError::Http { status: 409, .. }), "got {err:?}");

    Attribute::delete(&dset, "offset")?;
    assert_eq!(Attribute::list_names(&dset)?, vec!["scale"]);

    opened.close()?;
    attr.close()?;
    assert_eq!(conn.cache().len(ObjectKind::Attribute), 0);
    dset.close()?;
    group.close()?;
    file.close()?;
    assert_eq!(conn.term(), 0);
    Ok(())
}

#[test]
fn attributes_respect_read_only_intent() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let name = unique_domain();
    let file = File::create(&conn, &name, CreateFlags::default(), PlistId::DEFAULT, PlistId::DEFAULT)?;
    Attribute::create(&file, "title", &Datatype::native_i32(), &Dataspace::Scalar, PlistId::DEFAULT, PlistId::DEFAULT)?
        .close()?;
    file.close()?;

    let file = File::open(&conn, &name, Intent::ReadOnly, PlistId::DEFAULT)?;
    let err = Attribute::create(&file, "other", &Datatype::native_i32(), &Dataspace::Scalar, PlistId::DEFAULT, PlistId::DEFAULT)
        .err()
        .expect("read-only");
    assert!(matches!(err, RestError::PermissionDenied(_)), "got {err:?}");
    let err = Attribute::delete(&file, "title").unwrap_err();
    assert!(matches!(err, RestError::PermissionDenied(_)), "got {err:?}");

    let attr = Attribute::open(&file, "title", PlistId::DEFAULT)?;
    assert_eq!(attr.name(), "title");
    attr.close()?;
    file.close()?;
    Ok(())
}

#[test]
fn attributes_need_a_name() -> Result<()> {
    let mock = MockHsds::new();
    let conn = connector(&mock);
    let file = new_file(&conn)?;

    let err = Attribute::open(&file, "", PlistId::DEFAULT).err().expect("empty name");
    assert!(matches!(err, RestError::Argument(_)), "got {err:?}");
    let err = Attribute::open(&file, "absent", PlistId::DEFAULT).err().expect("no such attribute");
    assert!(err.is_not_found(), "got {err:?}");
    assert_eq!(conn.cache().len(ObjectKind::Attribute), 0);
    assert_eq!(file.domain().ref_count(), 1);

    file.close()?;
    Ok(())
}
